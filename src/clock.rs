//! Wall clock abstraction
//!
//! Expiry and rate windows read time through [`Clock`] so tests can drive a
//! simulated clock instead of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for simulated time
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Start at `secs` since the Unix epoch.
    pub fn at_epoch_secs(secs: i64) -> Self {
        Self::new(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch_secs(1_700_000_000);
        let before = clock.now();
        clock.advance_secs(90);
        assert_eq!((clock.now() - before).num_seconds(), 90);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = ManualClock::at_epoch_secs(0);
        let other = clock.clone();
        clock.advance_secs(5);
        assert_eq!(other.now().timestamp(), 5);
    }

    #[test]
    fn test_starts_exactly_at_given_second() {
        let clock = ManualClock::at_epoch_secs(1_700_000_000);
        assert_eq!(clock.now().timestamp(), 1_700_000_000);
        assert_ne!(clock.now().timestamp() % 60, 0);
    }
}
