//! Read-only view of a trace table image
//!
//! External tools see the table as raw bytes: a [`TraceBuffer::snapshot`]
//! or a copy of the arena taken some other way. [`TraceImage`] decodes the
//! header and walks the valid ranges without any API into the live table.
//!
//! [`TraceBuffer::snapshot`]: super::TraceBuffer::snapshot

use std::ops::Range;

use crate::error::{Result, SpinError};

use super::header::{
    HEADER_SIZE, OFFSET_FLAG, OFFSET_LAST, OFFSET_NEXT, OFFSET_SIZE, OFFSET_USER, OFFSET_WRAP,
    OFFSET_ZERO, X_HALT,
};

/// Width of a dump line
pub const LINE_SIZE: usize = 16;

/// Decoded trace table image
#[derive(Debug, Clone, Copy)]
pub struct TraceImage<'i> {
    bytes: &'i [u8],
    pub zero: u32,
    pub size: u32,
    pub next: u32,
    pub last: u32,
    pub wrap: u64,
    pub flag: [u8; 4],
    pub user: [u8; 4],
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_ne_bytes(raw)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_ne_bytes(raw)
}

impl<'i> TraceImage<'i> {
    /// Decode the header at the front of `bytes`.
    ///
    /// Only the checks needed to slice safely are made here; use
    /// [`verify_trace`](crate::verify::verify_trace) for the full set.
    pub fn parse(bytes: &'i [u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SpinError::InvalidImage {
                reason: format!("{} bytes cannot hold a {HEADER_SIZE}-byte header", bytes.len()),
            });
        }

        let zero = read_u32(bytes, OFFSET_ZERO);
        let size = read_u32(bytes, OFFSET_SIZE);
        if size as usize > bytes.len() {
            return Err(SpinError::InvalidImage {
                reason: format!("size {size:#x} exceeds the {:#x}-byte image", bytes.len()),
            });
        }
        if (zero as usize) < HEADER_SIZE || zero > size {
            return Err(SpinError::InvalidImage {
                reason: format!("zero {zero:#x} outside [{HEADER_SIZE:#x}, {size:#x}]"),
            });
        }

        let mut flag = [0u8; 4];
        let mut user = [0u8; 4];
        flag.copy_from_slice(&bytes[OFFSET_FLAG..OFFSET_FLAG + 4]);
        user.copy_from_slice(&bytes[OFFSET_USER..OFFSET_USER + 4]);

        Ok(Self {
            bytes: &bytes[..size as usize],
            zero,
            size,
            next: read_u32(bytes, OFFSET_NEXT),
            last: read_u32(bytes, OFFSET_LAST),
            wrap: read_u64(bytes, OFFSET_WRAP),
            flag,
            user,
        })
    }

    /// The whole table, header included
    pub fn bytes(&self) -> &'i [u8] {
        self.bytes
    }

    pub fn is_halted(&self) -> bool {
        self.flag[X_HALT] != 0
    }

    pub fn has_wrapped(&self) -> bool {
        self.wrap != 0
    }

    fn clamp(&self, offset: u32) -> usize {
        offset.clamp(self.zero, self.size) as usize
    }

    /// Range shown by a dump.
    ///
    /// Before any wrap this is `[zero, next)`. After a wrap it runs to the
    /// end of the previous lap or the current cursor, whichever is further.
    pub fn dump_range(&self) -> Range<usize> {
        let end = if self.has_wrapped() {
            self.last.max(self.next)
        } else {
            self.next
        };
        self.zero as usize..self.clamp(end)
    }

    /// Abandoned tail of a lap, `[max(last, next), size)`, if any.
    ///
    /// Bytes there belong to laps older than the previous one.
    pub fn stale_tail(&self) -> Option<Range<usize>> {
        if !self.has_wrapped() {
            return None;
        }
        let start = self.clamp(self.last.max(self.next));
        let size = self.size as usize;
        (start < size).then_some(start..size)
    }

    /// Ranges holding records, oldest first.
    ///
    /// After a wrap the remainder of the previous lap, `[next, last)`, comes
    /// before the current lap `[zero, next)`. Empty ranges are omitted.
    pub fn segments(&self) -> Vec<Range<usize>> {
        let zero = self.zero as usize;
        let next = self.clamp(self.next);
        let mut out = Vec::with_capacity(2);
        if self.has_wrapped() {
            let last = self.clamp(self.last);
            if next < last {
                out.push(next..last);
            }
        }
        if zero < next {
            out.push(zero..next);
        }
        out
    }

    /// Bytes of `range`, clamped to the table
    pub fn slice(&self, range: Range<usize>) -> &'i [u8] {
        let end = range.end.min(self.bytes.len());
        let start = range.start.min(end);
        &self.bytes[start..end]
    }

    /// Lines of the dump range as `(offset, bytes)`; the final line may be short
    pub fn lines(&self) -> Lines<'i> {
        let range = self.dump_range();
        Lines {
            bytes: self.bytes,
            at: range.start,
            end: range.end,
        }
    }
}

/// Iterator over [`LINE_SIZE`]-byte lines of a trace image
#[derive(Debug, Clone)]
pub struct Lines<'i> {
    bytes: &'i [u8],
    at: usize,
    end: usize,
}

impl<'i> Iterator for Lines<'i> {
    type Item = (usize, &'i [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.at >= self.end {
            return None;
        }
        let start = self.at;
        let stop = (start + LINE_SIZE).min(self.end);
        self.at = stop;
        Some((start, &self.bytes[start..stop]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end.saturating_sub(self.at).div_ceil(LINE_SIZE);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Lines<'_> {}
