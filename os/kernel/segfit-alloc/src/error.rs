//! Error types for the allocator's one genuinely fallible setup step.

/// Failure returned by [`Heap::init`](crate::Heap::init).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The grow primitive could not supply the initial
    /// `pad + table + MIN_BLOCK_SIZE` region.
    #[error("grow primitive failed to acquire the initial heap region")]
    GrowFailed,
}
