pub mod page_cache;
pub mod timed_validator;

#[doc(hidden)]
pub use page_cache::*;
#[doc(hidden)]
pub use timed_validator::*;

pub type DefaultCacheValidator = TimedCacheValidator;

use coarsetime::Instant;

/// Validators are used when working with caches and determine for how long
/// a specific cache entry stays fresh.
///
/// Expired entries are still served, the validator only decides when a refresh
/// has to be requested.
pub trait CacheValidator
where
    Self: Send + Sync,
{
    /// Returns the current time as seen by the validator.
    fn now(&self) -> Instant;
    /// Returns true if an entry filled at `timestamp` has to be refreshed at `now`.
    fn is_expired(&self, timestamp: Instant, now: Instant) -> bool;
}
