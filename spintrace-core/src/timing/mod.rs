//! # Trace Clock Sources
//!
//! Every trace record carries a 64-bit UTC timestamp in nanoseconds. The
//! trace table reads it from a [`Clock`], so tests can substitute a
//! deterministic source.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               TraceBuffer<C: Clock>          │
//! │  • stamps records via Slot::trace()          │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │                Clock (trait)                 │
//! ├──────────────────────┬───────────────────────┤
//! │ SystemClock          │ MockClock             │
//! │ (chrono::Utc)        │ (settable, testing)   │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! Wall-clock time is not monotonic. Readers that need a logical order use
//! the CAS grant order (arena position) and the timestamp together.

pub mod backends;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

pub use backends::{MockClock, SystemClock};

/// Nanosecond UTC clock consumed by the trace table
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch
    fn now_nanos(&self) -> u64;

    /// Clock name (for logging)
    fn name(&self) -> &'static str;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Render a record timestamp as RFC 3339 with nanosecond precision
pub fn format_nanos(nanos: u64) -> String {
    let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_nanos() {
        assert_eq!(format_nanos(0), "1970-01-01T00:00:00.000000000Z");
        assert_eq!(
            format_nanos(1_600_000_000_123_456_789),
            "2020-09-13T12:26:40.123456789Z"
        );
    }

    #[test]
    fn test_clock_through_arc() {
        let clock = Arc::new(MockClock::new(42));
        let shared: Arc<dyn Clock> = clock.clone();
        assert_eq!(shared.now_nanos(), 42);
        assert_eq!(shared.name(), "mock");
    }
}
