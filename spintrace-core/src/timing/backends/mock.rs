//! Mock clock for testing
//!
//! Returns a settable time, optionally advancing by a fixed step on every
//! read so consecutive records get distinct timestamps.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::timing::Clock;

/// Settable clock
#[derive(Debug, Default)]
pub struct MockClock {
    /// Current time in nanoseconds
    now: AtomicU64,
    /// Added after each read
    step: AtomicU64,
}

impl MockClock {
    /// Create a clock frozen at `nanos`
    pub fn new(nanos: u64) -> Self {
        Self {
            now: AtomicU64::new(nanos),
            step: AtomicU64::new(0),
        }
    }

    /// Create a clock that advances by `step` nanoseconds per read
    pub fn stepping(start: u64, step: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
            step: AtomicU64::new(step),
        }
    }

    /// Set the current time
    pub fn set(&self, nanos: u64) {
        self.now.store(nanos, Ordering::Relaxed);
    }

    /// Move the current time forward
    pub fn advance(&self, nanos: u64) {
        self.now.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Current time without stepping
    pub fn peek(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

impl Clock for MockClock {
    fn now_nanos(&self) -> u64 {
        let step = self.step.load(Ordering::Relaxed);
        self.now.fetch_add(step, Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_frozen() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.now_nanos(), 1_000);
        assert_eq!(clock.now_nanos(), 1_000);

        clock.advance(500);
        assert_eq!(clock.now_nanos(), 1_500);

        clock.set(7);
        assert_eq!(clock.peek(), 7);
    }

    #[test]
    fn test_mock_clock_stepping() {
        let clock = MockClock::stepping(100, 10);
        assert_eq!(clock.now_nanos(), 100);
        assert_eq!(clock.now_nanos(), 110);
        assert_eq!(clock.peek(), 120);
    }
}
