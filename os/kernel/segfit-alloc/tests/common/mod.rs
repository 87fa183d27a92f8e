//! Shared test double for the [`segfit_alloc::Grow`] primitive: a fixed-size,
//! zeroed, 8-aligned region with a bump cursor. Never shrinks, never moves.

use segfit_alloc::Grow;
use std::ptr::NonNull;

pub struct FixedGrow {
    buf: Vec<u64>,
    used: usize,
}

impl FixedGrow {
    /// Reserves a region of at least `capacity_bytes`, rounded up to a whole
    /// number of words.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            buf: vec![0u64; capacity_bytes.div_ceil(8)],
            used: 0,
        }
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.used
    }
}

impl Grow for FixedGrow {
    fn grow(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        let capacity = self.buf.len() * 8;
        if self.used + bytes > capacity {
            return None;
        }
        // SAFETY: `used + bytes <= capacity`, so this stays within `self.buf`.
        let ptr = unsafe { self.buf.as_mut_ptr().cast::<u8>().add(self.used) };
        self.used += bytes;
        NonNull::new(ptr)
    }

    fn heap_base(&self) -> Option<NonNull<u8>> {
        NonNull::new(self.buf.as_ptr().cast_mut().cast::<u8>())
    }

    fn heap_limit(&self) -> Option<NonNull<u8>> {
        // SAFETY: `used` never exceeds the backing buffer's length.
        let ptr = unsafe { self.buf.as_ptr().cast_mut().cast::<u8>().add(self.used) };
        NonNull::new(ptr)
    }
}
