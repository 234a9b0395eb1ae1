/*!
Validators are used when working with caches and determine for how long
a specific cache entry stays fresh.

This validator limits the freshness based on an actual time instant.
Internally it uses the [coarsetime](https://docs.rs/coarsetime/) crate as a less
computation intensive alternative for [std::time](https://doc.rust-lang.org/std/time/index.html).
Therefor the Duration has to be converted (e.g. via the .into() trait) when constructing this validator.

The default implementation will set the freshness window to 16 milliseconds,
which roughly matches a host redrawing its views at 60 frames per second.
*/

use super::CacheValidator;
use coarsetime::{Duration, Instant};

/// Default freshness window of a cached page in milliseconds.
pub const DEFAULT_FRESHNESS_MS: u64 = 16;

/// Validator for limiting the cache time based on a time `Instant`
#[derive(Clone, Debug)]
pub struct TimedCacheValidator {
    valid_time: Duration,
}

/// Creates a validator with a freshness window of 16 milliseconds.
impl Default for TimedCacheValidator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_FRESHNESS_MS))
    }
}

impl TimedCacheValidator {
    /// Creates a new TimedCacheValidator with a customizable Duration.
    ///
    /// # Examples:
    /// ```
    /// use std::time::Duration;
    /// use memproxy::mem::TimedCacheValidator;
    ///
    /// let _ = TimedCacheValidator::new(Duration::from_millis(5000).into());
    /// ```
    pub fn new(valid_time: Duration) -> Self {
        Self { valid_time }
    }

    pub fn valid_time(&self) -> Duration {
        self.valid_time
    }
}

impl CacheValidator for TimedCacheValidator {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn is_expired(&self, timestamp: Instant, now: Instant) -> bool {
        // a timestamp from the future (coarse clock update in between) is fresh
        now > timestamp && now.duration_since(timestamp) > self.valid_time
    }
}
