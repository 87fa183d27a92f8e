//! Placement policy: how a size class's free list is searched for a fit.

use crate::block::BlockHandle;
use crate::classes::ClassTable;

/// Selects how [`search`] picks a block out of a size class's free list.
///
/// Promoted to runtime configuration per the allocator's design notes: the
/// choice changes fragmentation behavior but no invariant depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Return the first block large enough to satisfy the request.
    FirstFit,
    /// Scan the whole list and return the smallest block that still fits,
    /// stopping early on an exact match.
    #[default]
    BestFit,
}

/// Searches class `class`'s free list for a block of at least `need` bytes.
pub(crate) fn search(table: ClassTable, class: usize, need: usize, policy: Policy) -> Option<BlockHandle> {
    match policy {
        Policy::FirstFit => table.iter(class).find(|b| b.size() >= need),
        Policy::BestFit => {
            let mut best: Option<BlockHandle> = None;
            for candidate in table.iter(class) {
                let size = candidate.size();
                if size < need {
                    continue;
                }
                if size == need {
                    return Some(candidate);
                }
                if best.is_none_or(|b| size < b.size()) {
                    best = Some(candidate);
                }
            }
            best
        }
    }
}
