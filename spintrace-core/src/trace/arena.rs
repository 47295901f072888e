//! Heap-backed arena for callers without a memory region of their own

use crate::config::MAX_ALIGNMENT;

/// Zero-filled heap region whose start is aligned to [`MAX_ALIGNMENT`]
///
/// ```rust
/// use spintrace_core::config::TraceConfig;
/// use spintrace_core::trace::{Arena, TraceBuffer};
///
/// let mut arena = Arena::new(0x1_0000);
/// let trace = TraceBuffer::make(arena.as_mut_slice(), TraceConfig::default()).unwrap();
/// assert_eq!(trace.size(), 0x1_0000);
/// ```
pub struct Arena {
    memory: Vec<u8>,
    start: usize,
    len: usize,
}

impl Arena {
    pub fn new(len: usize) -> Self {
        let align = MAX_ALIGNMENT as usize;
        let memory = vec![0u8; len + align];
        let start = memory.as_ptr().align_offset(align);
        Self { memory, start, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.memory[self.start..self.start + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.memory[self.start..self.start + self.len]
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("addr", &self.as_slice().as_ptr())
            .field("len", &self.len)
            .finish()
    }
}
