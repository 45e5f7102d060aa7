//! Clock
//!
//! Time source for expiration checks.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, PoisonError};

/// Clock interface (for dependency injection).
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing. Time only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    current: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Create a mock clock frozen at the current wall time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a mock clock frozen at `time`.
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(time),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) -> &Self {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += duration;
        self
    }

    /// Move time forward by whole seconds.
    pub fn advance_secs(&self, seconds: i64) -> &Self {
        self.advance(Duration::seconds(seconds))
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) -> &Self {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = time;
        self
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_is_frozen_until_advanced() {
        let start = Utc::now();
        let clock = MockClock::at(start);

        assert_eq!(clock.now(), start);
        clock.advance_secs(5);
        assert_eq!(clock.now(), start + Duration::seconds(5));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_moves() {
        let before = Utc::now();
        assert!(SystemClock.now() >= before);
    }
}
