//! Error types for spintrace operations
//!
//! Every failure the trace table or the latch can report is a variant of
//! [`SpinError`]. Variants are grouped into categories:
//!
//! - **Usage**: the caller broke an API contract (zero-length allocation,
//!   releasing a latch that is not held in that mode, ...). Fatal.
//! - **Capacity**: a 16-bit latch counter reached its ceiling. Fatal.
//! - **Validation**: bad construction input (arena bounds, configuration,
//!   a malformed arena image).
//! - **Diagnostic**: a configured spin limit tripped. Only produced when a
//!   spin limit has been configured.
//! - **Io** / **Internal**: sink failures and corrupted state.
//!
//! Outcomes that are part of normal control flow (`attempt_shared`
//! returning `false`, a wraparound) are never errors.
//!
//! # Example
//!
//! ```rust
//! use spintrace_core::error::{ErrorCategory, SpinError};
//!
//! fn report(err: &SpinError) {
//!     match err.category() {
//!         ErrorCategory::Usage => eprintln!("contract violation: {err}"),
//!         ErrorCategory::Capacity => eprintln!("design limit reached: {err}"),
//!         _ => eprintln!("{}: {err}", err.error_code()),
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for spintrace operations
pub type Result<T> = std::result::Result<T, SpinError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// API contract violated by the caller
    Usage,
    /// A bounded counter is at its ceiling
    Capacity,
    /// Construction input or configuration rejected
    Validation,
    /// Diagnostic spin limit exceeded
    Diagnostic,
    /// Output sink failure
    Io,
    /// Corrupted internal state
    Internal,
}

/// Errors that can occur in spintrace operations
#[derive(Error, Debug)]
pub enum SpinError {
    // ═══════════════════════════════════════════════════════════════════════
    // Trace table errors
    // ═══════════════════════════════════════════════════════════════════════

    /// The supplied memory region cannot hold a trace table
    #[error("Invalid trace arena: {reason}")]
    InvalidArena { reason: String },

    /// An allocation request of zero bytes or larger than the usable area
    #[error("Invalid trace allocation of {size} bytes: the trace table has {available} usable bytes and zero-length records are not allowed")]
    InvalidAllocation { size: usize, available: usize },

    /// A record was written into a slot too small to hold it
    #[error("Trace slot of {size} bytes cannot hold {needed} bytes")]
    SlotTooSmall { size: usize, needed: usize },

    /// The allocator retried more often than the configured spin limit
    #[error("Trace allocation exceeded the spin limit ({spins} retries); a .TAF record was written at offset {offset:#x}")]
    SpinLimitExceeded { spins: u32, offset: u32 },

    /// A raw arena image could not be parsed
    #[error("Invalid trace image: {reason}")]
    InvalidImage { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Latch errors
    // ═══════════════════════════════════════════════════════════════════════

    /// A latch operation was called in a state its contract forbids
    #[error("Latch({latch:#x}) {operation}: {reason} (word {word:#010x})")]
    LatchUsage {
        latch: usize,
        operation: &'static str,
        reason: &'static str,
        word: u32,
    },

    /// A latch counter is already at its ceiling
    #[error("Latch({latch:#x}) {operation}: {counter} count at capacity (word {word:#010x})")]
    LatchCapacity {
        latch: usize,
        operation: &'static str,
        counter: &'static str,
        word: u32,
    },

    /// A blocking latch operation spun past its configured timeout
    #[error("Latch({latch:#x}) {operation}: spin timeout after {spins} retries")]
    SpinTimeout {
        latch: usize,
        operation: &'static str,
        spins: u32,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Configuration is inconsistent
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// JSON configuration could not be parsed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Writing to a dump sink failed
    #[error("IO error: {message}")]
    IoError { message: String },

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    InternalError { reason: String },
}

impl From<std::io::Error> for SpinError {
    fn from(err: std::io::Error) -> Self {
        SpinError::IoError {
            message: err.to_string(),
        }
    }
}

impl SpinError {
    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            SpinError::InvalidAllocation { .. }
            | SpinError::SlotTooSmall { .. }
            | SpinError::LatchUsage { .. } => ErrorCategory::Usage,

            SpinError::LatchCapacity { .. } => ErrorCategory::Capacity,

            SpinError::InvalidArena { .. }
            | SpinError::InvalidImage { .. }
            | SpinError::InvalidConfig { .. }
            | SpinError::JsonError(_) => ErrorCategory::Validation,

            SpinError::SpinLimitExceeded { .. } | SpinError::SpinTimeout { .. } => {
                ErrorCategory::Diagnostic
            }

            SpinError::IoError { .. } => ErrorCategory::Io,

            SpinError::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            SpinError::InvalidArena { .. } => "INVALID_ARENA",
            SpinError::InvalidAllocation { .. } => "INVALID_ALLOCATION",
            SpinError::SlotTooSmall { .. } => "SLOT_TOO_SMALL",
            SpinError::SpinLimitExceeded { .. } => "SPIN_LIMIT_EXCEEDED",
            SpinError::InvalidImage { .. } => "INVALID_IMAGE",
            SpinError::LatchUsage { .. } => "LATCH_USAGE",
            SpinError::LatchCapacity { .. } => "LATCH_CAPACITY",
            SpinError::SpinTimeout { .. } => "SPIN_TIMEOUT",
            SpinError::InvalidConfig { .. } => "INVALID_CONFIG",
            SpinError::JsonError(_) => "JSON_ERROR",
            SpinError::IoError { .. } => "IO_ERROR",
            SpinError::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error indicates a defect in the calling program.
    ///
    /// Fatal errors must not be retried: the latch word or the allocation
    /// request is wrong, and continuing would compound the damage.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Usage | ErrorCategory::Capacity | ErrorCategory::Internal
        )
    }

    /// Returns true if this error might succeed on retry
    ///
    /// Only sink I/O failures qualify. Diagnostic spin limits flag a livelock
    /// or a leaked latch and are deliberately not retryable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SpinError::IoError { .. })
    }

    /// Converts this error to a JSON-serializable response object
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
                fatal: self.is_fatal(),
            },
        }
    }
}

/// JSON-serializable error report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail for JSON reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g., "LATCH_USAGE")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Error category
    pub category: ErrorCategory,
    /// Whether the error is a program defect
    pub fatal: bool,
}
