//! Invariant checks for trace images and latch words
//!
//! These run off the hot path, on a [`TraceImage`] or a raw latch word, and
//! report every violated invariant rather than stopping at the first.
//!
//! ```rust
//! use spintrace_core::latch::LatchWord;
//! use spintrace_core::verify::{verify_latch_word, Violation};
//!
//! assert!(verify_latch_word(LatchWord::pack(0, 3)).is_empty());
//! assert_eq!(
//!     verify_latch_word(LatchWord::pack(0, 0xFFFF)),
//!     vec![Violation::ExclusiveUnreserved { word: 0x0000_FFFF }]
//! );
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::error::{Result, SpinError};
use crate::latch::{LatchWord, EXCLUSIVE};
use crate::trace::{TraceImage, HEADER_SIZE};

/// A violated invariant
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    #[error("zero {zero:#x} is not {alignment}-byte aligned")]
    ZeroMisaligned { zero: u32, alignment: u32 },

    #[error("size {size:#x} is not {alignment}-byte aligned")]
    SizeMisaligned { size: u32, alignment: u32 },

    #[error("zero {zero:#x} leaves no room for the header")]
    ZeroInsideHeader { zero: u32 },

    #[error("next {next:#x} outside [{zero:#x}, {size:#x}]")]
    NextOutOfRange { next: u32, zero: u32, size: u32 },

    #[error("next {next:#x} is not {alignment}-byte aligned")]
    NextMisaligned { next: u32, alignment: u32 },

    #[error("last {last:#x} outside [{zero:#x}, {size:#x}]")]
    LastOutOfRange { last: u32, zero: u32, size: u32 },

    #[error("last {last:#x} is not {alignment}-byte aligned")]
    LastMisaligned { last: u32, alignment: u32 },

    #[error("last {last:#x} differs from size {size:#x} before any wrap")]
    LastMovedWithoutWrap { last: u32, size: u32 },

    #[error("latch word {word:#010x} is exclusive with no reservation")]
    ExclusiveUnreserved { word: u32 },

    #[error("latch word {word:#010x} has a reserve count at the exclusive sentinel")]
    ReserveOverflow { word: u32 },
}

/// Check a trace image against the table invariants for `alignment`
pub fn verify_trace(image: &TraceImage<'_>, alignment: u32) -> Vec<Violation> {
    let mut found = Vec::new();
    let misaligned = |value: u32| alignment != 0 && value % alignment != 0;
    let (zero, size) = (image.zero, image.size);

    if (zero as usize) < HEADER_SIZE {
        found.push(Violation::ZeroInsideHeader { zero });
    }
    if misaligned(zero) {
        found.push(Violation::ZeroMisaligned { zero, alignment });
    }
    if misaligned(size) {
        found.push(Violation::SizeMisaligned { size, alignment });
    }

    let next = image.next;
    if next < zero || next > size {
        found.push(Violation::NextOutOfRange { next, zero, size });
    } else if misaligned(next) {
        found.push(Violation::NextMisaligned { next, alignment });
    }

    let last = image.last;
    if last < zero || last > size {
        found.push(Violation::LastOutOfRange { last, zero, size });
    } else if misaligned(last) && last != size {
        found.push(Violation::LastMisaligned { last, alignment });
    }

    if !image.has_wrapped() && last != size {
        found.push(Violation::LastMovedWithoutWrap { last, size });
    }

    found
}

/// Check a latch word
pub fn verify_latch_word(word: impl Into<LatchWord>) -> Vec<Violation> {
    let word = word.into();
    let mut found = Vec::new();

    if word.is_exclusive() && !word.is_reserved() {
        found.push(Violation::ExclusiveUnreserved { word: word.raw() });
    }
    if word.reserve_count() == EXCLUSIVE {
        found.push(Violation::ReserveOverflow { word: word.raw() });
    }

    found
}

/// Turn a list of violations into an error naming all of them
pub fn ensure(violations: Vec<Violation>) -> Result<()> {
    if violations.is_empty() {
        return Ok(());
    }

    for violation in &violations {
        tracing::error!(%violation, "invariant violated");
    }
    let reason = violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(SpinError::InternalError { reason })
}
