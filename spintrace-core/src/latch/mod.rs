//! # Reader/Writer Latch
//!
//! A shared/exclusive latch whose entire state is one 32-bit word, updated
//! only by compare-and-swap loops. There is no OS mutex and no parking:
//! blocking operations spin with an escalating delay (see [`SpinDelay`]).
//!
//! ## States
//!
//! ```text
//!  UNHELD ──obtain_shared──► SHARED(n) ──obtain_exclusive──► DRAINING
//!   │   ▲                       │        (reserve)              │
//!   │   └────release_shared─────┘                               │ last sharer
//!   │                                                           ▼ releases
//!   │                                                        RESERVED
//!   │                                                           │
//!   └──────fast path──────► EXCLUSIVE ◄─────────claim───────────┘
//!                              │
//!                              ▼ release_exclusive
//!                   UNHELD, or RESERVED while others wait
//! ```
//!
//! Once a reservation is registered no new sharer is admitted, so exclusive
//! waiters cannot be starved by a stream of readers.
//!
//! ## Usage
//!
//! ```rust
//! use spintrace_core::latch::ReaderWriterLatch;
//!
//! let latch = ReaderWriterLatch::new();
//! {
//!     let _read = latch.shared().unwrap();
//!     assert!(latch.is_held_shared());
//! }
//! {
//!     let _write = latch.exclusive().unwrap();
//!     assert!(!latch.attempt_shared());
//! }
//! assert!(latch.word().is_unheld());
//! ```

mod guard;
mod reader_writer;
mod spin;
mod word;

pub use guard::{ExclusiveGuard, SharedGuard};
pub use reader_writer::ReaderWriterLatch;
pub use spin::SpinDelay;
pub use word::{
    LatchState, LatchWord, EXCLUSIVE, EXCLUSIVE_FAST, RESERVE_CAPACITY, RESERVE_MASK,
    RESERVE_ONE, SHARE_CAPACITY, SHARE_MASK, UNHELD,
};
