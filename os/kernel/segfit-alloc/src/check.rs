//! Diagnostic integrity checker. Read-only: never mutates the heap.

use crate::CLASSES;
use crate::LIMIT_COALESCE;
use crate::block::BlockHandle;
use crate::classes::{ClassTable, max_dim};
use core::fmt;

/// A single integrity-invariant violation found by [`Heap::check`](crate::Heap::check).
#[derive(Debug, Clone, Copy)]
pub enum Violation {
    /// Two adjacent free blocks, both above the coalesce threshold, escaped coalescing.
    UncoalescedNeighbors {
        /// Payload address of the left block.
        left: *const u8,
        /// Payload address of the right block.
        right: *const u8,
    },
    /// A block reachable from a size-class free list is marked in-use.
    FreeListBlockInUse {
        /// Payload address of the offending block.
        addr: *const u8,
        /// Size class its address was found under.
        class: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UncoalescedNeighbors { left, right } => write!(
                f,
                "adjacent free blocks at {left:p} and {right:p} escaped coalescing"
            ),
            Violation::FreeListBlockInUse { addr, class } => write!(
                f,
                "block {addr:p} is linked into free list {class} but marked in-use"
            ),
        }
    }
}

/// Counts of each violation kind found during a [`Heap::check`](crate::Heap::check) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    /// Number of adjacent-free-blocks-escaped-coalescing violations.
    pub uncoalesced_neighbors: usize,
    /// Number of free-list blocks found marked in-use.
    pub free_list_in_use: usize,
}

impl CheckSummary {
    /// Whether the heap passed every checked invariant.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.uncoalesced_neighbors == 0 && self.free_list_in_use == 0
    }
}

/// Runs both integrity invariants and reports violations to `sink`, logging
/// each one at `warn` level as it is found.
pub(crate) fn run<F: FnMut(Violation)>(
    table: ClassTable,
    first: BlockHandle,
    last: BlockHandle,
    mut sink: F,
) -> CheckSummary {
    let mut summary = CheckSummary::default();

    let mut cursor = first;
    while cursor != last {
        let right = cursor.right();
        let both_free = !cursor.in_use() && !right.in_use();
        let both_above_threshold = cursor.size() > max_dim(LIMIT_COALESCE) && right.size() > max_dim(LIMIT_COALESCE);
        if both_free && both_above_threshold {
            let violation = Violation::UncoalescedNeighbors {
                left: cursor.as_ptr(),
                right: right.as_ptr(),
            };
            log::warn!("{violation}");
            sink(violation);
            summary.uncoalesced_neighbors += 1;
        }
        cursor = right;
    }

    for class in 0..CLASSES {
        for block in table.iter(class) {
            if block.in_use() {
                let violation = Violation::FreeListBlockInUse {
                    addr: block.as_ptr(),
                    class,
                };
                log::warn!("{violation}");
                sink(violation);
                summary.free_list_in_use += 1;
            }
        }
    }

    summary
}
