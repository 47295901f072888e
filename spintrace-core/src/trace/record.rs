//! Standard trace record
//!
//! ```text
//! offset  field  bytes
//!      0  ident  4     type identifier, e.g. b".TAF"
//!      4  unit   4     big-endian code or four characters
//!      8  clock  8     big-endian UTC nanoseconds
//!     16  value  16    payload
//! ```
//!
//! Applications may allocate longer records; only the first 16 bytes
//! (ident, unit, clock) are common to every record.

use std::borrow::Cow;
use std::fmt;

use crate::error::{Result, SpinError};

/// Length of the common sub-header
pub const RECORD_HEADER_SIZE: usize = 16;

/// Length of a standard record
pub const RECORD_SIZE: usize = 32;

/// Length of the standard payload
pub const VALUE_SIZE: usize = 16;

/// Written in place of a slot when the allocation spin limit trips
pub const IDENT_SPIN_LIMIT: [u8; 4] = *b".TAF";

/// Stamped on the abandoned tail of a lap
pub const IDENT_LAP_END: [u8; 4] = *b".END";

/// Decoded standard record
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub ident: [u8; 4],
    pub unit: [u8; 4],
    pub clock: u64,
    pub value: [u8; VALUE_SIZE],
}

impl Record {
    /// Build a record whose unit is a big-endian code and whose value is
    /// `info`, truncated or NUL padded to 16 bytes
    pub fn with_code(ident: [u8; 4], code: u32, info: &[u8], clock: u64) -> Self {
        let mut value = [0u8; VALUE_SIZE];
        let n = info.len().min(VALUE_SIZE);
        value[..n].copy_from_slice(&info[..n]);
        Self {
            ident,
            unit: code.to_be_bytes(),
            clock,
            value,
        }
    }

    /// Build a record carrying two big-endian 64-bit words
    pub fn with_words(ident: [u8; 4], unit: [u8; 4], one: u64, two: u64, clock: u64) -> Self {
        let mut value = [0u8; VALUE_SIZE];
        value[..8].copy_from_slice(&one.to_be_bytes());
        value[8..].copy_from_slice(&two.to_be_bytes());
        Self {
            ident,
            unit,
            clock,
            value,
        }
    }

    /// Decode the first [`RECORD_SIZE`] bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; RECORD_SIZE] = bytes
            .get(..RECORD_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| SpinError::InvalidImage {
                reason: format!(
                    "record needs {RECORD_SIZE} bytes, {} available",
                    bytes.len()
                ),
            })?;

        let mut ident = [0u8; 4];
        let mut unit = [0u8; 4];
        let mut clock = [0u8; 8];
        let mut value = [0u8; VALUE_SIZE];
        ident.copy_from_slice(&bytes[0..4]);
        unit.copy_from_slice(&bytes[4..8]);
        clock.copy_from_slice(&bytes[8..16]);
        value.copy_from_slice(&bytes[16..32]);

        Ok(Self {
            ident,
            unit,
            clock: u64::from_be_bytes(clock),
            value,
        })
    }

    /// Encode into the on-arena representation
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.ident);
        out[4..8].copy_from_slice(&self.unit);
        out[8..16].copy_from_slice(&self.clock.to_be_bytes());
        out[16..32].copy_from_slice(&self.value);
        out
    }

    pub fn ident_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.ident)
    }

    /// Unit field read as a big-endian code
    pub fn code(&self) -> u32 {
        u32::from_be_bytes(self.unit)
    }

    /// Value field read as two big-endian words
    pub fn words(&self) -> (u64, u64) {
        let mut one = [0u8; 8];
        let mut two = [0u8; 8];
        one.copy_from_slice(&self.value[..8]);
        two.copy_from_slice(&self.value[8..]);
        (u64::from_be_bytes(one), u64::from_be_bytes(two))
    }

    /// Is this an unwritten (all zero) slot?
    pub fn is_empty(&self) -> bool {
        self.ident == [0; 4] && self.clock == 0
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("ident", &self.ident_str())
            .field("unit", &format_args!("{:#010x}", self.code()))
            .field("clock", &crate::timing::format_nanos(self.clock))
            .field("value", &hex::encode(self.value))
            .finish()
    }
}
