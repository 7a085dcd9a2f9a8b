//! Time sources for stamping and expiring cache entries.

use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

use super::lock::mutex_lock;

/// Supplies the current instant to the store and interceptor.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to the store
/// and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: OffsetDateTime) {
        *mutex_lock(&self.now, "clock.set") = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = mutex_lock(&self.now, "clock.advance");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *mutex_lock(&self.now, "clock.now")
    }
}
