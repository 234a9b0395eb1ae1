/*!
This module covers the local view of the foreign process memory.

The [cache](cache/index.html) module contains the page cache that answers the
host's synchronous reads, together with the validators deciding when a cached
page has to be refreshed from the remote peer.
*/

pub mod cache;

#[doc(hidden)]
pub use cache::*;
