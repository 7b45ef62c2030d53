//! Injected clock: no wall-clock reads outside this abstraction.
//!
//! Production code takes `Arc<dyn Clock>`; tests inject [`FixedClock`] so
//! timestamp-sensitive behavior (cache time rewrite, checkpoint round-trips)
//! is deterministic.

use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests; settable and advanceable.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Fixed clock at the epoch.
    pub fn at_epoch() -> Self {
        Self::new(Utc.timestamp_opt(0, 0).unwrap())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: FixedClock returns the set instant and advances deterministically.
    #[test]
    fn fixed_clock_set_and_advance() {
        let clock = FixedClock::at_epoch();
        assert_eq!(clock.now().timestamp(), 0);
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now().timestamp(), 90);
        clock.set(Utc.timestamp_opt(1000, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 1000);
    }
}
