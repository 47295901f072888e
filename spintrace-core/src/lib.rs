//! # spintrace core
//!
//! Two lock-free building blocks for multi-threaded programs:
//!
//! - **Trace table** ([`trace::TraceBuffer`]): a fixed-size circular arena,
//!   supplied by the caller, into which any number of threads record
//!   variable-length events with a single compare-and-swap per record
//! - **Reader/writer latch** ([`latch::ReaderWriterLatch`]): shared and
//!   exclusive access coordinated through one 32-bit word, with exclusive
//!   reservations that keep writers from starving
//!
//! Neither component takes an OS lock on its hot path. Waiting, where it
//! exists, is a spin with an escalating delay.
//!
//! ## Example
//!
//! ```rust
//! use spintrace_core::{Arena, ReaderWriterLatch, TraceBuffer, TraceConfig};
//!
//! // The caller owns the memory; the trace table only borrows it
//! let mut arena = Arena::new(0x1_0000);
//! let trace = TraceBuffer::make(arena.as_mut_slice(), TraceConfig::default()).unwrap();
//!
//! let latch = ReaderWriterLatch::new();
//! std::thread::scope(|s| {
//!     for id in 0..4u32 {
//!         let (trace, latch) = (&trace, &latch);
//!         s.spawn(move || {
//!             let _read = latch.shared().unwrap();
//!             trace.write(b"WORK", id, b"started").unwrap();
//!         });
//!     }
//! });
//!
//! assert_eq!(trace.stats().used, 4 * 32);
//! assert!(latch.word().is_unheld());
//! ```

pub mod config;
pub mod error;
pub mod latch;
pub mod timing;
pub mod trace;
pub mod verify;

mod sync;

#[cfg(feature = "ffi")]
pub mod ffi;

// Re-export main types
pub use config::{SpinConfig, TraceConfig};
pub use error::{ErrorCategory, ErrorDetail, ErrorResponse, Result, SpinError};
pub use latch::{ExclusiveGuard, LatchState, LatchWord, ReaderWriterLatch, SharedGuard};
pub use timing::{Clock, MockClock, SystemClock};
pub use trace::{Arena, BufferStats, Record, Slot, TraceBuffer, TraceImage};
pub use verify::{verify_latch_word, verify_trace, Violation};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn test_trace_and_latch_together() {
        let mut arena = Arena::new(0x1_0000);
        let trace = TraceBuffer::make(arena.as_mut_slice(), TraceConfig::default()).unwrap();
        let latch = ReaderWriterLatch::new();

        // Writers record under the exclusive latch, readers verify under shared.
        std::thread::scope(|s| {
            for id in 0..4u64 {
                let (trace, latch) = (&trace, &latch);
                s.spawn(move || {
                    for n in 0..100u64 {
                        let _write = latch.exclusive().unwrap();
                        trace.write_words(b"STEP", b"thrd", id, n).unwrap();
                    }
                });
            }
        });

        assert!(latch.word().is_unheld());
        assert_eq!(trace.stats().used, 400 * 32);

        let snapshot = trace.snapshot();
        let image = TraceImage::parse(&snapshot).unwrap();
        assert!(verify_trace(&image, 32).is_empty());

        let mut seen = vec![0u64; 4];
        for range in image.segments() {
            for chunk in image.slice(range).chunks(32) {
                let record = Record::parse(chunk).unwrap();
                assert_eq!(record.ident_str(), "STEP");
                let (id, n) = record.words();
                // Each writer's records appear in order.
                assert_eq!(n, seen[id as usize]);
                seen[id as usize] += 1;
            }
        }
        assert_eq!(seen, vec![100; 4]);
    }

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
