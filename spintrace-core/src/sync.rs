//! Atomic primitives, swapped for loom's under `--features loom` tests.

#[cfg(all(feature = "loom", test))]
pub(crate) use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(all(feature = "loom", test)))]
pub(crate) use std::sync::atomic::{AtomicU32, Ordering};

/// Give up the processor once.
#[cfg(all(feature = "loom", test))]
pub(crate) fn yield_now() {
    loom::thread::yield_now();
}

#[cfg(not(all(feature = "loom", test)))]
pub(crate) fn yield_now() {
    std::thread::yield_now();
}
