/*!
The remote peer owning the foreign process.

The peer is only reachable through a request/response channel. Every request is a
single JSON encoded [`Command`](protocol::Command) and every response a single JSON
object, see the [protocol](protocol/index.html) module for the exact format.
*/

pub mod protocol;

#[doc(hidden)]
pub use protocol::{decode_read_response, Command};

use std::sync::Arc;
use std::time::Duration;

/// Synchronous transport to the remote peer.
///
/// Implementations block the calling thread for at most `timeout` and return `None`
/// when the peer did not answer in time or the transport failed.
///
/// The channel is only ever driven from the worker thread, it is never called on a
/// host thread.
pub trait RemoteChannel: Send + Sync {
    fn send(&self, command: &str, timeout: Duration) -> Option<String>;
}

impl<T: RemoteChannel + ?Sized> RemoteChannel for Arc<T> {
    #[inline]
    fn send(&self, command: &str, timeout: Duration) -> Option<String> {
        (**self).send(command, timeout)
    }
}

impl<T: RemoteChannel + ?Sized> RemoteChannel for Box<T> {
    #[inline]
    fn send(&self, command: &str, timeout: Duration) -> Option<String> {
        (**self).send(command, timeout)
    }
}
