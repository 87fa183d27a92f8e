//! On-heap block layout and the narrow unsafe boundary around it.
//!
//! A block looks like this on the heap, addressed by its payload pointer:
//!
//! ```text
//!            HEADER_SIZE                               FOOTER_SIZE
//!          ┌───────────┐                                ┌───────────┐
//!  ... ────┤ size|used │ payload (or prev/next when free) │ size|used ├──── ...
//!          └───────────┘                                └───────────┘
//!                      ^ BlockHandle points here
//! ```
//!
//! Header and footer are always written together; nothing outside this
//! module reads or writes heap memory directly.

use core::ptr::NonNull;

/// Machine word width used for headers, footers, and free-list links.
pub(crate) const WORD: usize = size_of::<usize>();

/// Header size in bytes.
pub(crate) const HEADER_SIZE: usize = WORD;

/// Footer size in bytes.
pub(crate) const FOOTER_SIZE: usize = WORD;

/// Combined header + footer overhead.
pub(crate) const HF_OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

/// Smallest block that can exist in the heap: header + footer + two link words.
pub(crate) const MIN_BLOCK_SIZE: usize = align8(HF_OVERHEAD + 2 * WORD);

/// Rounds `size` up to the next multiple of 8.
pub(crate) const fn align8(size: usize) -> usize {
    (size + 7) & !7
}

/// Total on-heap size needed to hold `payload` requested bytes: header,
/// footer, and alignment padding, floored at [`MIN_BLOCK_SIZE`].
pub(crate) fn required_total_size(payload: usize) -> usize {
    align8(payload + HF_OVERHEAD).max(MIN_BLOCK_SIZE)
}

/// Sentinel address used to encode "no block" in on-heap link words.
///
/// Real heap addresses supplied by any [`Grow`](crate::Grow) implementation
/// are never zero, so zero is free to use as the link-list `None`.
const NONE_LINK: usize = 0;

/// A handle to a block, identified by the address of its payload.
///
/// This is the narrow unsafe boundary the rest of the crate talks through:
/// every read or write of heap memory for a block goes through one of these
/// methods. Everywhere else, a block is just this value (`Copy`, indexed by
/// address) rather than a raw pointer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockHandle(NonNull<u8>);

impl BlockHandle {
    /// Wraps a raw payload pointer as a block handle.
    ///
    /// # Safety
    /// `ptr` must point at the payload of a live, correctly tagged block.
    pub(crate) unsafe fn from_payload(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Returns the payload address as exposed to callers of `allocate`/`resize`.
    #[must_use]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    fn header_ptr(self) -> *mut usize {
        // SAFETY: every block has a header word immediately before its payload.
        unsafe { self.0.as_ptr().sub(HEADER_SIZE).cast::<usize>() }
    }

    fn footer_ptr(self, size: usize) -> *mut usize {
        // SAFETY: every block of `size` bytes has a footer word at `payload + size - footer`.
        unsafe {
            self.0
                .as_ptr()
                .add(size)
                .sub(HF_OVERHEAD)
                .cast::<usize>()
        }
    }

    /// Reads the block's total size (header + payload + footer) from its header.
    pub(crate) fn size(self) -> usize {
        // SAFETY: header word is always initialized for a live block.
        unsafe { *self.header_ptr() & !7 }
    }

    /// Reads the block's `in_use` flag from its header.
    pub(crate) fn in_use(self) -> bool {
        // SAFETY: header word is always initialized for a live block.
        unsafe { *self.header_ptr() & 1 != 0 }
    }

    /// Total on-heap footprint of this block: header + payload + footer.
    #[must_use]
    pub fn total_size(self) -> usize {
        self.size()
    }

    /// Number of bytes usable by the caller: total size minus header/footer overhead.
    #[must_use]
    pub fn payload_len(self) -> usize {
        self.size() - HF_OVERHEAD
    }

    /// Whether this block is currently allocated (as opposed to sitting on a free list).
    #[must_use]
    pub fn is_in_use(self) -> bool {
        self.in_use()
    }

    /// Writes `size`/`in_use` to both header and footer. The two writes are
    /// never split across callers: this is the only way to tag a block.
    pub(crate) fn set_tag(self, size: usize, in_use: bool) {
        let word = size | usize::from(in_use);
        // SAFETY: header/footer slots belong to this block by construction.
        unsafe {
            self.header_ptr().write(word);
            self.footer_ptr(size).write(word);
        }
    }

    fn link_slot(self, offset: usize) -> *mut usize {
        // SAFETY: free blocks reserve their first two payload words for links.
        unsafe { self.0.as_ptr().add(offset).cast::<usize>() }
    }

    /// Reads the `prev` free-list link (valid only while the block is free).
    pub(crate) fn prev(self) -> Option<BlockHandle> {
        // SAFETY: link slot is valid to read for any block at least `MIN_BLOCK_SIZE`.
        let addr = unsafe { *self.link_slot(0) };
        (addr != NONE_LINK).then(|| BlockHandle(unsafe { NonNull::new_unchecked(addr as *mut u8) }))
    }

    /// Reads the `next` free-list link (valid only while the block is free).
    pub(crate) fn next(self) -> Option<BlockHandle> {
        // SAFETY: link slot is valid to read for any block at least `MIN_BLOCK_SIZE`.
        let addr = unsafe { *self.link_slot(WORD) };
        (addr != NONE_LINK).then(|| BlockHandle(unsafe { NonNull::new_unchecked(addr as *mut u8) }))
    }

    /// Writes the `prev` free-list link.
    pub(crate) fn set_prev(self, v: Option<BlockHandle>) {
        let addr = v.map_or(NONE_LINK, |b| b.0.as_ptr() as usize);
        // SAFETY: link slot belongs to this (free) block.
        unsafe { self.link_slot(0).write(addr) };
    }

    /// Writes the `next` free-list link.
    pub(crate) fn set_next(self, v: Option<BlockHandle>) {
        let addr = v.map_or(NONE_LINK, |b| b.0.as_ptr() as usize);
        // SAFETY: link slot belongs to this (free) block.
        unsafe { self.link_slot(WORD).write(addr) };
    }

    /// Returns the handle for the block immediately to the right of this one.
    ///
    /// Caller must first check this block is not the heap's last block.
    pub(crate) fn right(self) -> BlockHandle {
        let size = self.size();
        // SAFETY: caller guarantees a right neighbor exists at `payload + size`.
        let ptr = unsafe { self.0.as_ptr().add(size) };
        BlockHandle(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Returns the handle for the block immediately to the left of this one.
    ///
    /// Caller must first check this block is not the heap's first block.
    /// Reads the left neighbor's footer (which sits right before this
    /// block's header) to discover its size.
    pub(crate) fn left(self) -> BlockHandle {
        // SAFETY: a left neighbor's footer word sits at `header - footer_size`.
        let left_footer = unsafe { self.0.as_ptr().sub(HF_OVERHEAD).cast::<usize>() };
        let left_size = unsafe { *left_footer & !7 };
        let ptr = unsafe { self.0.as_ptr().sub(left_size) };
        BlockHandle(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Constructs a block at `base` (the header address, not the payload)
    /// with the given size and tag, returning its handle.
    ///
    /// # Safety
    /// `[base, base + size)` must be valid, writable, 8-aligned memory owned
    /// by the heap and not otherwise in use.
    pub(crate) unsafe fn write_new(base: NonNull<u8>, size: usize, in_use: bool) -> BlockHandle {
        let payload = unsafe { base.as_ptr().add(HEADER_SIZE) };
        let handle = BlockHandle(unsafe { NonNull::new_unchecked(payload) });
        handle.set_tag(size, in_use);
        handle
    }
}
