//! The heap-growth primitive: the one collaborator this crate never implements
//! for production use, only consumes.

use core::ptr::NonNull;

/// Extends a contiguous, monotonically growing memory region on demand.
///
/// Implementations own the actual reservation (a `brk`/`mmap`-backed region,
/// a static array, a bump allocator over borrowed memory, ...). This crate
/// only ever calls [`grow`](Grow::grow) with 8-aligned sizes and never asks
/// for memory back.
pub trait Grow {
    /// Extends the region by exactly `bytes` (always 8-aligned) and returns
    /// the address of the first new byte, or `None` if the region cannot be
    /// grown further. On `None`, the region's prior state is unchanged.
    fn grow(&mut self, bytes: usize) -> Option<NonNull<u8>>;

    /// Lowest address ever handed out by `grow`, if any. Used only by the
    /// integrity checker's introspection; has no effect on allocator
    /// correctness.
    fn heap_base(&self) -> Option<NonNull<u8>> {
        None
    }

    /// Address one past the last byte ever handed out by `grow`, if any.
    fn heap_limit(&self) -> Option<NonNull<u8>> {
        None
    }
}
