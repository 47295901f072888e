//! Trace table header
//!
//! The header sits at the front of the arena and is read as raw bytes by
//! external tooling, so its layout is fixed:
//!
//! ```text
//! offset  field  type         meaning
//!      0  zero   u32          offset of the first record
//!      4  size   u32          arena length
//!      8  next   atomic u32   offset of the next record
//!     12  last   atomic u32   end of the previous lap
//!     16  wrap   atomic u64   wraparound count
//!     24  flag   [u8; 4]      [0] halt, [3] address adjustment
//!     28  user   [u8; 4]      application bytes
//! ```
//!
//! All fields use native byte order.

use std::mem::{align_of, size_of};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Header length in bytes
pub const HEADER_SIZE: usize = 32;

/// `flag` index: non-zero once tracing is halted
pub const X_HALT: usize = 0;

/// `flag` index: bytes skipped to align the arena address
pub const X_OFFSET: usize = 3;

pub(crate) const OFFSET_ZERO: usize = 0;
pub(crate) const OFFSET_SIZE: usize = 4;
pub(crate) const OFFSET_NEXT: usize = 8;
pub(crate) const OFFSET_LAST: usize = 12;
pub(crate) const OFFSET_WRAP: usize = 16;
pub(crate) const OFFSET_FLAG: usize = 24;
pub(crate) const OFFSET_USER: usize = 28;

#[repr(C)]
#[derive(Debug)]
pub(crate) struct TraceHeader {
    pub zero: u32,
    pub size: u32,
    pub next: AtomicU32,
    pub last: AtomicU32,
    pub wrap: AtomicU64,
    pub flag: [AtomicU8; 4],
    pub user: [AtomicU8; 4],
}

const _: () = assert!(size_of::<TraceHeader>() == HEADER_SIZE);
const _: () = assert!(align_of::<TraceHeader>() <= crate::config::MIN_ALIGNMENT as usize);

impl TraceHeader {
    pub fn new(zero: u32, size: u32, adjust: u8) -> Self {
        Self {
            zero,
            size,
            next: AtomicU32::new(zero),
            last: AtomicU32::new(size),
            wrap: AtomicU64::new(0),
            flag: [
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(adjust),
            ],
            user: [
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
            ],
        }
    }

    pub fn is_halted(&self) -> bool {
        self.flag[X_HALT].load(Ordering::Acquire) != 0
    }

    pub fn halt(&self) {
        self.flag[X_HALT].store(1, Ordering::Release);
    }

    pub fn flags(&self) -> [u8; 4] {
        std::array::from_fn(|i| self.flag[i].load(Ordering::Relaxed))
    }

    pub fn user(&self) -> [u8; 4] {
        std::array::from_fn(|i| self.user[i].load(Ordering::Relaxed))
    }

    pub fn set_user(&self, bytes: [u8; 4]) {
        for (slot, byte) in self.user.iter().zip(bytes) {
            slot.store(byte, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_header_layout_is_stable() {
        assert_eq!(offset_of!(TraceHeader, zero), OFFSET_ZERO);
        assert_eq!(offset_of!(TraceHeader, size), OFFSET_SIZE);
        assert_eq!(offset_of!(TraceHeader, next), OFFSET_NEXT);
        assert_eq!(offset_of!(TraceHeader, last), OFFSET_LAST);
        assert_eq!(offset_of!(TraceHeader, wrap), OFFSET_WRAP);
        assert_eq!(offset_of!(TraceHeader, flag), OFFSET_FLAG);
        assert_eq!(offset_of!(TraceHeader, user), OFFSET_USER);
    }

    #[test]
    fn test_new_header() {
        let header = TraceHeader::new(32, 4096, 8);
        assert_eq!(header.next.load(Ordering::Relaxed), 32);
        assert_eq!(header.last.load(Ordering::Relaxed), 4096);
        assert_eq!(header.flags(), [0, 0, 0, 8]);
        assert!(!header.is_halted());

        header.halt();
        assert!(header.is_halted());

        header.set_user(*b"APP1");
        assert_eq!(&header.user(), b"APP1");
    }
}
