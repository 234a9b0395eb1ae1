/*!
Test doubles for the remote peer and the cache clock.
*/

mod channel;

pub use channel::DummyChannel;

use crate::mem::CacheValidator;

use std::sync::atomic::{AtomicBool, Ordering};

use coarsetime::Instant;

/// Validator whose verdict is switched by hand.
///
/// Useful where waiting for a freshness window to pass would make tests flaky.
#[derive(Default)]
pub struct DummyValidator {
    expired: AtomicBool,
}

impl DummyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every cached page fresh (`false`) or expired (`true`).
    pub fn set_expired(&self, expired: bool) {
        self.expired.store(expired, Ordering::SeqCst);
    }
}

impl CacheValidator for DummyValidator {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn is_expired(&self, _timestamp: Instant, _now: Instant) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}
