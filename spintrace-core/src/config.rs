//! Configuration for trace tables and latch spinning

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpinError};
use crate::trace::header::HEADER_SIZE;

/// Default record/table alignment
pub const DEFAULT_ALIGNMENT: u32 = 32;

/// Smallest supported alignment (the header holds a 64-bit atomic)
pub const MIN_ALIGNMENT: u32 = 8;

/// Largest supported alignment (the address adjustment is stored in one byte)
pub const MAX_ALIGNMENT: u32 = 256;

/// Default minimum trace table size
pub const TABLE_SIZE_MIN: u64 = 0x0001_0000;

/// Largest trace table size; offsets are 32-bit
pub const TABLE_SIZE_MAX: u64 = 0xFFFF_FF00;

/// Trace table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Record and table alignment, a power of two
    #[serde(default = "default_alignment")]
    pub alignment: u32,

    /// Smallest accepted arena length
    #[serde(default = "default_min_size")]
    pub min_size: u64,

    /// Largest accepted arena length
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Diagnostic mode: CAS retries tolerated in one allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spin_limit: Option<u32>,

    /// Diagnostic mode: halt tracing when the spin limit trips
    #[serde(default)]
    pub halt_on_spin_limit: bool,
}

fn default_alignment() -> u32 {
    DEFAULT_ALIGNMENT
}

fn default_min_size() -> u64 {
    TABLE_SIZE_MIN
}

fn default_max_size() -> u64 {
    TABLE_SIZE_MAX
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            min_size: TABLE_SIZE_MIN,
            max_size: TABLE_SIZE_MAX,
            spin_limit: None,
            halt_on_spin_limit: false,
        }
    }
}

impl TraceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the alignment
    pub fn alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set the accepted arena length range
    pub fn size_range(mut self, min_size: u64, max_size: u64) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Enable the diagnostic spin limit
    pub fn spin_limit(mut self, spins: u32) -> Self {
        self.spin_limit = Some(spins);
        self
    }

    /// Halt tracing when the spin limit trips
    pub fn halt_on_spin_limit(mut self, halt: bool) -> Self {
        self.halt_on_spin_limit = halt;
        self
    }

    /// Offset of the first record for this alignment
    pub fn zero_offset(&self) -> u32 {
        align_up(HEADER_SIZE as u64, self.alignment as u64) as u32
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        let alignment = self.alignment;
        if !alignment.is_power_of_two() || !(MIN_ALIGNMENT..=MAX_ALIGNMENT).contains(&alignment) {
            return Err(SpinError::InvalidConfig {
                reason: format!(
                    "alignment {alignment} must be a power of two in [{MIN_ALIGNMENT}, {MAX_ALIGNMENT}]"
                ),
            });
        }

        if self.max_size > TABLE_SIZE_MAX {
            return Err(SpinError::InvalidConfig {
                reason: format!(
                    "max_size {:#x} exceeds the 32-bit offset limit {TABLE_SIZE_MAX:#x}",
                    self.max_size
                ),
            });
        }

        // The smallest table must hold its header plus one record.
        let floor = self.zero_offset() as u64 + alignment as u64;
        if self.min_size < floor {
            return Err(SpinError::InvalidConfig {
                reason: format!(
                    "min_size {:#x} cannot hold the header and one record ({floor:#x})",
                    self.min_size
                ),
            });
        }

        if self.min_size > self.max_size {
            return Err(SpinError::InvalidConfig {
                reason: format!(
                    "min_size {:#x} exceeds max_size {:#x}",
                    self.min_size, self.max_size
                ),
            });
        }

        Ok(())
    }
}

/// Spin/backoff configuration for blocking latch operations
///
/// A waiter first backs off (spin, then yield). Every `sleep_every` retries
/// it sleeps for `spins * sleep_unit_ns`, capped at `max_sleep_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinConfig {
    /// Retries between sleeps
    #[serde(default = "default_sleep_every")]
    pub sleep_every: u32,

    /// Sleep time per accumulated retry, in nanoseconds
    #[serde(default = "default_sleep_unit_ns")]
    pub sleep_unit_ns: u64,

    /// Upper bound on a single sleep, in microseconds
    #[serde(default = "default_max_sleep_us")]
    pub max_sleep_us: u64,

    /// Diagnostic mode: fail after this many retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_spins: Option<u32>,
}

fn default_sleep_every() -> u32 {
    SpinConfig::DEFAULT.sleep_every
}

fn default_sleep_unit_ns() -> u64 {
    SpinConfig::DEFAULT.sleep_unit_ns
}

fn default_max_sleep_us() -> u64 {
    SpinConfig::DEFAULT.max_sleep_us
}

impl SpinConfig {
    /// Production defaults: never time out
    pub const DEFAULT: SpinConfig = SpinConfig {
        sleep_every: 256,
        // One retry is worth 2^-20 seconds of sleep.
        sleep_unit_ns: 954,
        max_sleep_us: 15_625,
        timeout_spins: None,
    };

    /// Retry count after which diagnostic builds give up
    pub const DIAGNOSTIC_TIMEOUT: u32 = 1 << 20;

    /// Defaults with the diagnostic timeout enabled
    pub const fn diagnostic() -> Self {
        SpinConfig {
            timeout_spins: Some(Self::DIAGNOSTIC_TIMEOUT),
            ..Self::DEFAULT
        }
    }

    /// Set the retries between sleeps
    pub fn sleep_every(mut self, spins: u32) -> Self {
        self.sleep_every = spins.max(1);
        self
    }

    /// Cap the length of a single sleep
    pub fn max_sleep(mut self, max: Duration) -> Self {
        self.max_sleep_us = max.as_micros() as u64;
        self
    }

    /// Fail after `spins` retries
    pub fn timeout_spins(mut self, spins: u32) -> Self {
        self.timeout_spins = Some(spins);
        self
    }

    /// Sleep duration for the given retry count
    pub fn sleep_for(&self, spins: u32) -> Duration {
        let nanos = (spins as u64).saturating_mul(self.sleep_unit_ns);
        Duration::from_nanos(nanos).min(Duration::from_micros(self.max_sleep_us))
    }
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Round `value` up to a multiple of `align` (a power of two)
pub(crate) const fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + (align - 1)) & !(align - 1)
}

/// Round `value` down to a multiple of `align` (a power of two)
pub(crate) const fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TraceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.zero_offset(), 32);
    }

    #[test]
    fn test_zero_offset_tracks_alignment() {
        assert_eq!(TraceConfig::new().alignment(8).zero_offset(), 32);
        assert_eq!(TraceConfig::new().alignment(16).zero_offset(), 32);
        assert_eq!(TraceConfig::new().alignment(64).zero_offset(), 64);
    }

    #[test]
    fn test_rejects_bad_alignment() {
        for alignment in [0, 4, 24, 512] {
            let err = TraceConfig::new().alignment(alignment).validate().unwrap_err();
            assert_eq!(err.error_code(), "INVALID_CONFIG");
        }
    }

    #[test]
    fn test_rejects_inverted_or_tiny_range() {
        assert!(TraceConfig::new().size_range(0x2000, 0x1000).validate().is_err());
        assert!(TraceConfig::new().size_range(16, 0x1000).validate().is_err());
        assert!(TraceConfig::new()
            .size_range(0x1000, TABLE_SIZE_MAX + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = TraceConfig::from_json_str(r#"{"alignment": 16, "spin_limit": 64}"#).unwrap();
        assert_eq!(config.alignment, 16);
        assert_eq!(config.spin_limit, Some(64));
        assert_eq!(config.min_size, TABLE_SIZE_MIN);
        assert!(!config.halt_on_spin_limit);

        assert!(TraceConfig::from_json_str(r#"{"alignment": 12}"#).is_err());
    }

    #[test]
    fn test_spin_sleep_is_capped() {
        let spin = SpinConfig::default();
        assert_eq!(spin.sleep_for(256), Duration::from_nanos(256 * 954));
        assert_eq!(spin.sleep_for(u32::MAX), Duration::from_micros(15_625));
        assert_eq!(SpinConfig::diagnostic().timeout_spins, Some(1 << 20));
    }

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_up(500, 16), 512);
        assert_eq!(align_up(512, 16), 512);
        assert_eq!(align_down(4100, 32), 4096);
    }
}
