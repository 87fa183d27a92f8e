//! Selective coalescing: merge a freed block with free neighbors above the
//! coalesce threshold, using boundary tags for O(1) neighbor navigation.

use crate::LIMIT_COALESCE;
use crate::block::BlockHandle;
use crate::classes::{ClassTable, class_of, max_dim};

/// A neighbor is eligible to be absorbed during coalescing only if it is
/// free and its class is strictly above [`LIMIT_COALESCE`]. Blocks at or
/// below the threshold act as coalesce barriers even when free, protecting
/// the small-class LIFO reuse path from fragmentation churn.
fn eligible(b: BlockHandle) -> bool {
    !b.in_use() && b.size() > max_dim(LIMIT_COALESCE)
}

/// Merges `block` with any eligible free neighbors on both sides.
///
/// `first`/`last` are the heap's current first- and last-block anchors, used
/// to bound the walk. Returns the handle of the surviving (leftmost) merged
/// block and whether the heap's `last` anchor must be updated to it (true
/// whenever the rightward walk's final position was the previous last
/// block — including the case where `block` itself already was `last` and
/// the walk took zero steps).
pub(crate) fn coalesce(
    table: ClassTable,
    block: BlockHandle,
    first: BlockHandle,
    last: BlockHandle,
) -> (BlockHandle, bool) {
    let mut total = block.size();
    let mut cursor = block;

    while cursor != last {
        let right = cursor.right();
        if !eligible(right) {
            break;
        }
        total += right.size();
        table.remove(class_of(right.size()), right);
        cursor = right;
    }
    // `cursor` is now the rightmost block absorbed (or `block` itself if the
    // loop never ran). Either way, if it's `last`, the merged block must
    // become the new `last` — including the zero-iteration case where
    // `block` was already the heap's last block.
    let absorbed_last = cursor == last;

    let mut leftmost = block;
    while leftmost != first {
        let left = leftmost.left();
        if !eligible(left) {
            break;
        }
        total += left.size();
        table.remove(class_of(left.size()), left);
        leftmost = left;
    }

    leftmost.set_tag(total, false);
    (leftmost, absorbed_last)
}
