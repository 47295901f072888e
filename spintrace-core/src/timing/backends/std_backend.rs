//! Wall clock backed by chrono

use chrono::Utc;

use crate::timing::Clock;

/// UTC system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        // `None` only past the year 2262.
        Utc::now()
            .timestamp_nanos_opt()
            .map(|nanos| nanos.max(0) as u64)
            .unwrap_or(u64::MAX)
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        let clock = SystemClock::new();
        let now = clock.now_nanos();
        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800_000_000_000);
        assert_eq!(clock.name(), "system");
    }
}
