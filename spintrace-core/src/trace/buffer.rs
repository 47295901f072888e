//! Lock-free circular trace table
//!
//! Threads reserve variable-length slots by advancing the shared `next`
//! cursor with compare-and-swap. A request that does not fit in the rest of
//! the arena wraps: the slot goes to `zero` and the abandoned cursor is
//! published as `last`.
//!
//! ```text
//!  0        zero                      next                 last    size
//!  ├────────┼─────────────────────────┼────────────────────┼───────┤
//!  │ header │ records of this lap     │ records of the     │ stale │
//!  │        │                         │ previous lap       │       │
//!  └────────┴─────────────────────────┴────────────────────┴───────┘
//! ```
//!
//! There is no commit step: a slot is part of the arena as soon as
//! [`TraceBuffer::allocate`] returns, and readers must tolerate records that
//! are still being written.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::{align_down, align_up, TraceConfig};
use crate::error::{Result, SpinError};
use crate::timing::{Clock, SystemClock};

use super::header::TraceHeader;
use super::record::{Record, IDENT_SPIN_LIMIT, RECORD_HEADER_SIZE, RECORD_SIZE};

/// Snapshot of the table's counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Usable bytes (`size - zero`)
    pub capacity: u32,
    /// Bytes used in the current lap
    pub used: u32,
    /// Current cursor
    pub next: u32,
    /// End of the previous lap
    pub last: u32,
    /// Wraparounds so far
    pub wraps: u64,
    /// Tracing halted
    pub halted: bool,
}

impl BufferStats {
    /// Fraction of the current lap in use (0.0 - 1.0)
    pub fn pressure(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used as f64 / self.capacity as f64
    }
}

/// Circular trace table over a caller-supplied arena
///
/// The arena is borrowed for `'a`; the table never allocates. Shared
/// references may be handed to any number of threads.
pub struct TraceBuffer<'a, C: Clock = SystemClock> {
    base: NonNull<u8>,
    zero: u32,
    size: u32,
    config: TraceConfig,
    clock: C,
    _arena: PhantomData<&'a mut [u8]>,
}

// The arena is only mutated through atomics in the header and through
// disjoint slots handed out by the CAS on `next`.
unsafe impl<C: Clock> Send for TraceBuffer<'_, C> {}
unsafe impl<C: Clock> Sync for TraceBuffer<'_, C> {}

impl<'a> TraceBuffer<'a, SystemClock> {
    /// Build a trace table over `arena`, stamping records with the system clock
    pub fn make(arena: &'a mut [u8], config: TraceConfig) -> Result<Self> {
        Self::make_with_clock(arena, config, SystemClock)
    }
}

impl<'a, C: Clock> TraceBuffer<'a, C> {
    /// Build a trace table over `arena` with an explicit clock.
    ///
    /// The arena start is rounded up and its length down to the alignment,
    /// then the region is zero-filled and the header written.
    pub fn make_with_clock(arena: &'a mut [u8], config: TraceConfig, clock: C) -> Result<Self> {
        let len = arena.len();
        // SAFETY: the exclusive borrow covers `len` bytes for `'a`.
        unsafe { Self::from_raw_parts(arena.as_mut_ptr(), len, config, clock) }
    }

    /// Build a trace table over a raw region.
    ///
    /// # Safety
    ///
    /// Unless `addr` is null, `addr..addr + len` must be valid for reads and
    /// writes for `'a` and must not be accessed other than through the
    /// returned table.
    pub unsafe fn from_raw_parts(
        addr: *mut u8,
        len: usize,
        config: TraceConfig,
        clock: C,
    ) -> Result<Self> {
        config.validate()?;

        let base = NonNull::new(addr).ok_or_else(|| SpinError::InvalidArena {
            reason: "null address".to_string(),
        })?;

        let length = len as u64;
        if length < config.min_size || length > config.max_size {
            return Err(SpinError::InvalidArena {
                reason: format!(
                    "length {length:#x} outside [{:#x}, {:#x}]",
                    config.min_size, config.max_size
                ),
            });
        }

        let alignment = config.alignment as usize;
        let misalign = base.as_ptr() as usize & (alignment - 1);
        let adjust = if misalign == 0 { 0 } else { alignment - misalign };

        let zero = config.zero_offset();
        let size = align_down((len - adjust) as u64, alignment as u64);
        if size < zero as u64 + alignment as u64 {
            return Err(SpinError::InvalidArena {
                reason: format!("aligned length {size:#x} cannot hold the header and one record"),
            });
        }
        let size = size as u32;

        // SAFETY: adjust < alignment <= min_size <= len, and the caller
        // guarantees the region is valid for writes.
        let base = NonNull::new_unchecked(base.as_ptr().add(adjust));
        ptr::write_bytes(base.as_ptr(), 0, size as usize);
        ptr::write(
            base.as_ptr().cast::<TraceHeader>(),
            TraceHeader::new(zero, size, adjust as u8),
        );

        tracing::debug!(
            zero,
            size,
            adjust,
            alignment = config.alignment,
            clock = clock.name(),
            "trace table created"
        );

        Ok(Self {
            base,
            zero,
            size,
            config,
            clock,
            _arena: PhantomData,
        })
    }

    fn header(&self) -> &TraceHeader {
        // SAFETY: `base` is aligned to at least MIN_ALIGNMENT and holds an
        // initialised header for the table's lifetime.
        unsafe { &*self.base.as_ptr().cast::<TraceHeader>() }
    }

    /// Reserve `size` bytes, rounded up to the alignment.
    ///
    /// Writes nothing outside the returned slot; the abandoned tail of a
    /// lap keeps whatever it held. Never blocks. Fails only for a
    /// zero-length or oversized request, or when the diagnostic spin limit
    /// trips.
    pub fn allocate(&self, size: usize) -> Result<Slot<'_>> {
        let available = self.size - self.zero;
        if size == 0 || size as u64 > available as u64 {
            return Err(self.invalid_allocation(size, available));
        }
        let rounded = align_up(size as u64, self.config.alignment as u64);
        if rounded > available as u64 {
            return Err(self.invalid_allocation(size, available));
        }
        let size = rounded as u32;

        let header = self.header();
        let mut spins: u32 = 0;
        let mut old = header.next.load(Ordering::Acquire);
        let (offset, wrapped) = loop {
            let (offset, new, wrapped) = if old as u64 + size as u64 > self.size as u64 {
                (self.zero, self.zero + size, true)
            } else {
                (old, old + size, false)
            };

            match header
                .next
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break (offset, wrapped),
                Err(current) => {
                    old = current;
                    spins = spins.saturating_add(1);
                }
            }
        };

        if wrapped {
            let wraps = header.wrap.fetch_add(1, Ordering::AcqRel) + 1;
            header.last.store(old, Ordering::Release);
            tracing::trace!(wraps, last = old, "trace table wrapped");
        }

        let slot = Slot {
            ptr: self.slot_ptr(offset),
            offset,
            size,
            clock: &self.clock,
            _arena: PhantomData,
        };

        if let Some(limit) = self.config.spin_limit {
            if spins > limit {
                return Err(self.spin_limit_exceeded(slot, spins));
            }
        }

        Ok(slot)
    }

    /// [`allocate`](Self::allocate), or `None` while tracing is halted
    pub fn allocate_if(&self, size: usize) -> Result<Option<Slot<'_>>> {
        if !self.is_active() {
            return Ok(None);
        }
        self.allocate(size).map(Some)
    }

    /// Write a standard record with a code and up to 16 bytes of info.
    ///
    /// Returns the record offset, or `None` while halted.
    pub fn write(&self, ident: &[u8; 4], code: u32, info: &[u8]) -> Result<Option<u32>> {
        let Some(mut slot) = self.allocate_if(RECORD_SIZE)? else {
            return Ok(None);
        };
        let record = Record::with_code(*ident, code, info, 0);
        slot.write_record(&record)?;
        Ok(Some(slot.offset()))
    }

    /// Write a standard record carrying two 64-bit words
    pub fn write_words(
        &self,
        ident: &[u8; 4],
        unit: &[u8; 4],
        one: u64,
        two: u64,
    ) -> Result<Option<u32>> {
        let Some(mut slot) = self.allocate_if(RECORD_SIZE)? else {
            return Ok(None);
        };
        let record = Record::with_words(*ident, *unit, one, two, 0);
        slot.write_record(&record)?;
        Ok(Some(slot.offset()))
    }

    /// Halt tracing; [`allocate_if`](Self::allocate_if) returns `None` from now on
    pub fn deactivate(&self) {
        if self.is_active() {
            tracing::warn!("trace table halted");
        }
        self.header().halt();
    }

    pub fn is_active(&self) -> bool {
        !self.header().is_halted()
    }

    /// Arena offset of `ptr`, if it points into the table
    pub fn offset_of(&self, ptr: *const u8) -> Option<u32> {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + self.size as usize {
            return None;
        }
        Some((addr - base) as u32)
    }

    pub fn zero(&self) -> u32 {
        self.zero
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn next(&self) -> u32 {
        self.header().next.load(Ordering::Acquire)
    }

    /// End of the previous lap.
    ///
    /// Advisory while several threads wrap at once: a wrapping thread
    /// publishes `last` after its CAS, so a preempted one can store an older
    /// lap's end over a newer one.
    pub fn last(&self) -> u32 {
        self.header().last.load(Ordering::Acquire)
    }

    pub fn wraps(&self) -> u64 {
        self.header().wrap.load(Ordering::Acquire)
    }

    /// Header flag bytes
    pub fn flags(&self) -> [u8; 4] {
        self.header().flags()
    }

    /// Application bytes in the header
    pub fn user(&self) -> [u8; 4] {
        self.header().user()
    }

    pub fn set_user(&self, bytes: [u8; 4]) {
        self.header().set_user(bytes);
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Address of the (aligned) table start
    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub fn stats(&self) -> BufferStats {
        let header = self.header();
        let next = header.next.load(Ordering::Acquire);
        BufferStats {
            capacity: self.size - self.zero,
            used: next.saturating_sub(self.zero),
            next,
            last: header.last.load(Ordering::Acquire),
            wraps: header.wrap.load(Ordering::Acquire),
            halted: header.is_halted(),
        }
    }

    /// Copy the whole table, header included.
    ///
    /// Concurrent writers are not stopped; records being written may be
    /// captured partially.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut image = vec![0u8; self.size as usize];
        // SAFETY: the table spans `size` readable bytes.
        unsafe {
            ptr::copy_nonoverlapping(self.base.as_ptr(), image.as_mut_ptr(), image.len());
        }
        image
    }

    fn slot_ptr(&self, offset: u32) -> NonNull<u8> {
        // SAFETY: every offset handed out lies inside the table.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset as usize)) }
    }

    /// Replace the slot with a `.TAF` record and report the failure
    fn spin_limit_exceeded(&self, mut slot: Slot<'_>, spins: u32) -> SpinError {
        if self.config.halt_on_spin_limit {
            self.deactivate();
        }

        let offset = slot.offset();
        let clock = self.clock.now_nanos();
        let record = Record::with_code(IDENT_SPIN_LIMIT, spins, b"allocate", clock);
        slot.write_truncated(&record.to_bytes());

        tracing::warn!(spins, offset, "trace allocation exceeded the spin limit");
        SpinError::SpinLimitExceeded { spins, offset }
    }

    fn invalid_allocation(&self, size: usize, available: u32) -> SpinError {
        tracing::error!(size, available, "invalid trace allocation");
        SpinError::InvalidAllocation {
            size,
            available: available as usize,
        }
    }
}

impl<C: Clock> std::fmt::Debug for TraceBuffer<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceBuffer")
            .field("base", &self.base)
            .field("zero", &self.zero)
            .field("size", &self.size)
            .field("next", &self.next())
            .field("last", &self.last())
            .field("wraps", &self.wraps())
            .field("clock", &self.clock.name())
            .finish()
    }
}

/// A reserved region of the arena
///
/// Owned by the allocating thread until the cursor laps it.
pub struct Slot<'b> {
    ptr: NonNull<u8>,
    offset: u32,
    size: u32,
    clock: &'b dyn Clock,
    _arena: PhantomData<&'b mut [u8]>,
}

unsafe impl Send for Slot<'_> {}

impl Slot<'_> {
    /// Offset from the table start
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length in bytes, a multiple of the alignment
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Copy `bytes` into the slot at `at`
    pub fn write_bytes(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        let needed = at.saturating_add(bytes.len());
        if needed > self.size as usize {
            return Err(SpinError::SlotTooSmall {
                size: self.size as usize,
                needed,
            });
        }
        // SAFETY: bounds checked above; the slot range is ours.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(at), bytes.len());
        }
        Ok(())
    }

    /// Stamp the common sub-header: `ident` and the current clock
    pub fn trace(&mut self, ident: &[u8; 4]) -> Result<()> {
        if (self.size as usize) < RECORD_HEADER_SIZE {
            return Err(SpinError::SlotTooSmall {
                size: self.size as usize,
                needed: RECORD_HEADER_SIZE,
            });
        }
        let clock = self.clock.now_nanos();
        self.write_bytes(8, &clock.to_be_bytes())?;
        self.write_bytes(0, ident)
    }

    /// Write a standard record, stamping it with the current clock
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let bytes = record.to_bytes();
        self.write_bytes(4, &bytes[4..8])?;
        self.write_bytes(16, &bytes[16..RECORD_SIZE])?;
        self.trace(&record.ident)
    }

    fn write_truncated(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.size as usize);
        // SAFETY: `n` is within the slot.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr(), n);
        }
    }
}

impl std::fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}
