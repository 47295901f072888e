//! Shared/exclusive latch on a single 32-bit word
//!
//! Word transitions (`reserve.share`, hex):
//!
//! ```text
//! obtain shared       0000.nnnn -> 0000.(nnnn+1)     capacity error at nnnn == fffe
//! release shared      mmmm.nnnn -> mmmm.(nnnn-1)     usage error at nnnn == 0000 | ffff
//! obtain exclusive    0000.0000 -> 0001.ffff         uncontended
//!                     mmmm.nnnn -> (mmmm+1).nnnn     reserve; capacity error at mmmm == fffe
//!                     mmmm.0000 -> mmmm.ffff         once sharers drain
//! release exclusive   mmmm.ffff -> (mmmm-1).0000     usage error unless held exclusive
//! downgrade           mmmm.ffff -> (mmmm-1).0001
//! upgrade             mmmm.0001 -> (mmmm+1).ffff     only for the sole sharer
//! ```
//!
//! While any reservation exists no new sharer is admitted, so a registered
//! exclusive waiter completes once the current sharers release.

use crate::config::SpinConfig;
use crate::error::{Result, SpinError};
use crate::sync::{AtomicU32, Ordering};

use super::spin::SpinDelay;
use super::word::{
    LatchState, LatchWord, EXCLUSIVE, EXCLUSIVE_FAST, RESERVE_CAPACITY, RESERVE_MASK,
    RESERVE_ONE, SHARE_CAPACITY, SHARE_MASK, UNHELD,
};

/// Reader/writer latch
///
/// Shared holders may coexist; an exclusive holder excludes everyone. The
/// latch does not record which thread holds it.
#[derive(Debug, Default)]
pub struct ReaderWriterLatch {
    word: AtomicU32,
}

impl ReaderWriterLatch {
    /// Create an unheld latch
    pub fn new() -> Self {
        Self {
            word: AtomicU32::new(UNHELD),
        }
    }

    /// Current word
    pub fn word(&self) -> LatchWord {
        LatchWord::from_raw(self.word.load(Ordering::Acquire))
    }

    /// Current logical state
    pub fn state(&self) -> LatchState {
        self.word().state()
    }

    /// Is the latch held by at least one sharer?
    pub fn is_held_shared(&self) -> bool {
        self.word().is_shared()
    }

    /// Is the latch held exclusively?
    pub fn is_held_exclusive(&self) -> bool {
        self.word().is_exclusive()
    }

    /// Unconditionally return the latch to the unheld state.
    ///
    /// Only meaningful when no thread holds or waits for the latch.
    pub fn reset(&self) {
        self.word.store(UNHELD, Ordering::Release);
    }

    /// Try to obtain the latch shared without waiting.
    ///
    /// Fails if any exclusive reservation exists or the share count is at
    /// capacity.
    pub fn attempt_shared(&self) -> bool {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let word = LatchWord::from_raw(old);
            if word.is_reserved() || word.share_count() >= SHARE_CAPACITY {
                return false;
            }

            match self.word.compare_exchange_weak(
                old,
                old + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => old = current,
            }
        }
    }

    /// Try to obtain the latch exclusively without waiting.
    ///
    /// Succeeds only when the latch is completely unheld.
    pub fn attempt_exclusive(&self) -> bool {
        self.word
            .compare_exchange(UNHELD, EXCLUSIVE_FAST, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Obtain the latch shared, waiting while exclusive reservations exist
    pub fn obtain_shared(&self) -> Result<()> {
        self.obtain_shared_with(&SpinConfig::DEFAULT)
    }

    /// [`obtain_shared`](Self::obtain_shared) with an explicit spin policy
    pub fn obtain_shared_with(&self, spin: &SpinConfig) -> Result<()> {
        let mut delay = SpinDelay::new(spin);
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let word = LatchWord::from_raw(old);
            if word.is_reserved() {
                if let Err(spins) = delay.pause() {
                    return Err(self.timeout("obtain_shared", spins));
                }
                old = self.word.load(Ordering::Acquire);
                continue;
            }

            if word.share_count() >= SHARE_CAPACITY {
                return Err(self.capacity("obtain_shared", "share", old));
            }

            match self.word.compare_exchange_weak(
                old,
                old + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => {
                    old = current;
                    if let Err(spins) = delay.contended() {
                        return Err(self.timeout("obtain_shared", spins));
                    }
                }
            }
        }
    }

    /// Obtain the latch exclusively.
    ///
    /// Registers a reservation first, which blocks new sharers, then waits
    /// for the current holders to release.
    pub fn obtain_exclusive(&self) -> Result<()> {
        self.obtain_exclusive_with(&SpinConfig::DEFAULT)
    }

    /// [`obtain_exclusive`](Self::obtain_exclusive) with an explicit spin policy
    pub fn obtain_exclusive_with(&self, spin: &SpinConfig) -> Result<()> {
        if self.attempt_exclusive() {
            return Ok(());
        }

        self.reserve()?;

        let mut delay = SpinDelay::new(spin);
        loop {
            let current = self.word.load(Ordering::Acquire);
            let reserved = current & RESERVE_MASK;
            debug_assert!(reserved != 0, "our reservation vanished");

            // Sharers must drain and any other exclusive holder must release.
            if current & SHARE_MASK == 0
                && self
                    .word
                    .compare_exchange_weak(
                        reserved,
                        reserved | SHARE_MASK,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                return Ok(());
            }

            if let Err(spins) = delay.pause() {
                self.cancel_reservation();
                return Err(self.timeout("obtain_exclusive", spins));
            }
        }
    }

    /// Register one exclusive reservation
    fn reserve(&self) -> Result<()> {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            if LatchWord::from_raw(old).reserve_count() >= RESERVE_CAPACITY {
                return Err(self.capacity("obtain_exclusive", "reserve", old));
            }

            match self.word.compare_exchange_weak(
                old,
                old + RESERVE_ONE,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => old = current,
            }
        }
    }

    /// Withdraw a reservation that never became exclusive
    fn cancel_reservation(&self) {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let new = old - RESERVE_ONE;
            match self.word.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(current) => old = current,
            }
        }
    }

    /// Release one shared hold
    pub fn release_shared(&self) -> Result<()> {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let share = LatchWord::from_raw(old).share_count();
            if share == 0 {
                return Err(self.usage("release_shared", "latch not held shared", old));
            }
            if share == EXCLUSIVE {
                return Err(self.usage("release_shared", "latch held exclusive", old));
            }

            match self.word.compare_exchange_weak(
                old,
                old - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => old = current,
            }
        }
    }

    /// Release the exclusive hold
    pub fn release_exclusive(&self) -> Result<()> {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let word = LatchWord::from_raw(old);
            if !word.is_exclusive() {
                return Err(self.usage("release_exclusive", "latch not held exclusive", old));
            }
            if !word.is_reserved() {
                return Err(self.usage("release_exclusive", "exclusive reserve count is zero", old));
            }

            let new = (old & RESERVE_MASK) - RESERVE_ONE;
            match self.word.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(()),
                Err(current) => old = current,
            }
        }
    }

    /// Downgrade an exclusive hold to a single shared hold
    pub fn modify_to_shared(&self) -> Result<()> {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let word = LatchWord::from_raw(old);
            if !word.is_exclusive() {
                return Err(self.usage("modify_to_shared", "latch not held exclusive", old));
            }
            if !word.is_reserved() {
                return Err(self.usage("modify_to_shared", "exclusive reserve count is zero", old));
            }

            let new = ((old & RESERVE_MASK) - RESERVE_ONE) | 1;
            match self.word.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(()),
                Err(current) => old = current,
            }
        }
    }

    /// Upgrade the caller's shared hold to exclusive.
    ///
    /// Only the sole sharer can upgrade; with other sharers present this
    /// returns `false` and the caller must release and obtain exclusively.
    pub fn modify_to_exclusive(&self) -> bool {
        let mut old = self.word.load(Ordering::Acquire);
        loop {
            let word = LatchWord::from_raw(old);
            if word.share_count() != 1 || word.reserve_count() >= RESERVE_CAPACITY {
                return false;
            }

            let new = ((old & RESERVE_MASK) + RESERVE_ONE) | SHARE_MASK;
            match self.word.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(current) => old = current,
            }
        }
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    fn usage(&self, operation: &'static str, reason: &'static str, word: u32) -> SpinError {
        tracing::error!(
            latch = format_args!("{:#x}", self.address()),
            word = %LatchWord::from_raw(word),
            "{operation}: {reason}"
        );
        SpinError::LatchUsage {
            latch: self.address(),
            operation,
            reason,
            word,
        }
    }

    fn capacity(&self, operation: &'static str, counter: &'static str, word: u32) -> SpinError {
        tracing::error!(
            latch = format_args!("{:#x}", self.address()),
            word = %LatchWord::from_raw(word),
            "{operation}: {counter} count at capacity"
        );
        SpinError::LatchCapacity {
            latch: self.address(),
            operation,
            counter,
            word,
        }
    }

    fn timeout(&self, operation: &'static str, spins: u32) -> SpinError {
        tracing::warn!(
            latch = format_args!("{:#x}", self.address()),
            spins,
            "{operation}: spin timeout"
        );
        SpinError::SpinTimeout {
            latch: self.address(),
            operation,
            spins,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_word(&self, raw: u32) {
        self.word.store(raw, Ordering::Release);
    }
}
