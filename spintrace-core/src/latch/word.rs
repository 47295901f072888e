//! Latch word encoding
//!
//! ```text
//!  31            16 15             0
//! ┌────────────────┬────────────────┐
//! │ reserve count  │  share count   │
//! └────────────────┴────────────────┘
//! ```
//!
//! A share count of `0xFFFF` means the latch is held exclusively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mask of the share count
pub const SHARE_MASK: u32 = 0x0000_FFFF;

/// Mask of the reserve count
pub const RESERVE_MASK: u32 = 0xFFFF_0000;

/// One exclusive reservation
pub const RESERVE_ONE: u32 = 0x0001_0000;

/// Share count sentinel: held exclusively
pub const EXCLUSIVE: u16 = 0xFFFF;

/// Largest share count reachable by increment
pub const SHARE_CAPACITY: u16 = 0xFFFE;

/// Largest reserve count reachable by increment
pub const RESERVE_CAPACITY: u16 = 0xFFFE;

/// Unheld, unreserved
pub const UNHELD: u32 = 0;

/// Reserved once and held exclusively, the result of an uncontended acquire
pub const EXCLUSIVE_FAST: u32 = RESERVE_ONE | SHARE_MASK;

/// Decoded latch word
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatchWord(u32);

impl LatchWord {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn pack(reserve: u16, share: u16) -> Self {
        Self(((reserve as u32) << 16) | share as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Outstanding exclusive reservations
    pub const fn reserve_count(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Shared holders, or [`EXCLUSIVE`]
    pub const fn share_count(self) -> u16 {
        self.0 as u16
    }

    pub const fn is_unheld(self) -> bool {
        self.0 == UNHELD
    }

    pub const fn is_exclusive(self) -> bool {
        self.share_count() == EXCLUSIVE
    }

    pub const fn is_shared(self) -> bool {
        let share = self.share_count();
        share != 0 && share != EXCLUSIVE
    }

    pub const fn is_reserved(self) -> bool {
        self.reserve_count() != 0
    }

    pub fn state(self) -> LatchState {
        match (self.reserve_count(), self.share_count()) {
            (0, 0) => LatchState::Unheld,
            (reserve, EXCLUSIVE) => LatchState::Exclusive { reserve },
            (reserve, 0) => LatchState::Reserved { reserve },
            (0, holders) => LatchState::Shared { holders },
            (reserve, holders) => LatchState::Draining { reserve, holders },
        }
    }
}

impl fmt::Debug for LatchWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LatchWord({:04x}.{:04x})", self.reserve_count(), self.share_count())
    }
}

impl fmt::Display for LatchWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}.{:04x}", self.reserve_count(), self.share_count())
    }
}

impl From<u32> for LatchWord {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<LatchWord> for u32 {
    fn from(word: LatchWord) -> Self {
        word.0
    }
}

/// Logical latch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LatchState {
    /// Nobody holds or waits for the latch
    Unheld,
    /// Held by `holders` sharers, no reservation
    Shared { holders: u16 },
    /// Sharers still hold the latch while exclusive waiters have reserved it
    Draining { reserve: u16, holders: u16 },
    /// Reserved, no holders; an exclusive waiter is about to take it
    Reserved { reserve: u16 },
    /// Held exclusively by one owner
    Exclusive { reserve: u16 },
}
