//! # Trace Table
//!
//! A fixed-size circular arena shared by any number of producer threads.
//! Producers reserve variable-length records with a single compare-and-swap
//! on the arena cursor: no locks, no per-record allocation, no commit step.
//!
//! ## Architecture
//!
//! ```text
//! Producers (any thread)            Consumers (tooling, not hot)
//! ──────────────────────            ────────────────────────────
//! allocate(size) ──► CAS next ──┐   snapshot() ──► TraceImage::parse
//!   └─ Slot::trace(ident)       │                    ├─ segments()
//! write(ident, code, info)      │                    └─ lines()
//!                               ▼
//!                         ┌───────────┐
//!                         │   arena   │ ◄──── dump(&sink)
//!                         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use spintrace_core::config::TraceConfig;
//! use spintrace_core::trace::{Arena, Record, TraceBuffer};
//!
//! let mut arena = Arena::new(0x1_0000);
//! let trace = TraceBuffer::make(arena.as_mut_slice(), TraceConfig::default()).unwrap();
//!
//! let mut slot = trace.allocate(32).unwrap();
//! slot.write_record(&Record::with_code(*b"OPEN", 7, b"config.json", 0)).unwrap();
//!
//! let offset = slot.offset() as usize;
//! let record = Record::parse(&trace.snapshot()[offset..]).unwrap();
//! assert_eq!(record.ident_str(), "OPEN");
//! assert_eq!(record.code(), 7);
//! ```

mod arena;
mod buffer;
mod dump;
pub(crate) mod header;
mod reader;
mod record;

pub use arena::Arena;
pub use buffer::{BufferStats, Slot, TraceBuffer};
pub use dump::{format_line, stderr_sink, write_image, DumpSink};
pub use header::{HEADER_SIZE, X_HALT, X_OFFSET};
pub use reader::{Lines, TraceImage, LINE_SIZE};
pub use record::{
    Record, IDENT_LAP_END, IDENT_SPIN_LIMIT, RECORD_HEADER_SIZE, RECORD_SIZE, VALUE_SIZE,
};
