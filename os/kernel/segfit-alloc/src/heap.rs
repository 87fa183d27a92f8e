//! Public entry points: the heap context bundling table/first/last anchors,
//! and the `init`/`allocate`/`free`/`resize`/`check` operations over it.
//!
//! Per the allocator's design notes, there is no global mutable state here:
//! everything lives in one [`Heap`] value threaded through by the caller.

use crate::block::{self, BlockHandle, required_total_size};
use crate::check::{self, CheckSummary, Violation};
use crate::classes::{self, ClassTable};
use crate::coalesce;
use crate::error::InitError;
use crate::grow::Grow;
use crate::placement::{self, Policy};
use crate::{CLASSES, LIMIT_COALESCE};
use core::ptr::NonNull;

/// State that only exists once the heap has been initialized.
struct HeapState {
    table: ClassTable,
    first: BlockHandle,
    last: BlockHandle,
}

/// A segregated-fits heap over a caller-supplied [`Grow`] primitive.
///
/// Construct with [`Heap::new`], call [`init`](Heap::init) exactly once, then
/// drive it with [`allocate`](Heap::allocate), [`free`](Heap::free), and
/// [`resize`](Heap::resize). There is no internal synchronization: the
/// engine is single-threaded by design (see the crate's concurrency model),
/// and `&mut self` is the only serialization it needs.
pub struct Heap<G: Grow> {
    grower: G,
    policy: Policy,
    state: Option<HeapState>,
}

impl<G: Grow> Heap<G> {
    /// Creates an uninitialized heap over `grower` using the best-fit placement policy.
    pub fn new(grower: G) -> Self {
        Self::with_policy(grower, Policy::default())
    }

    /// Creates an uninitialized heap over `grower` using the given placement policy.
    pub fn with_policy(grower: G, policy: Policy) -> Self {
        Self {
            grower,
            policy,
            state: None,
        }
    }

    /// Reports whether [`init`](Heap::init) has been called successfully.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Currently configured placement policy.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Changes the placement policy used by future [`allocate`](Heap::allocate) calls.
    ///
    /// Per the design notes, the policy choice affects fragmentation behavior
    /// only; no invariant depends on it, so it may be changed at any time.
    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    /// Reserves the size-class table plus one minimum-size free block from
    /// the grow primitive and brings the heap into a usable state.
    ///
    /// # Errors
    /// Returns [`InitError::GrowFailed`] if the grow primitive cannot supply
    /// the initial region. The heap is left uninitialized in that case.
    pub fn init(&mut self) -> Result<(), InitError> {
        let table_size = ClassTable::byte_size();
        // Padding so the first block's payload (table_base + table_size + HEADER_SIZE) lands 8-aligned.
        let pad = block::align8(table_size + block::HEADER_SIZE) - table_size - block::HEADER_SIZE;
        let total = pad + table_size + block::MIN_BLOCK_SIZE;

        let base = self.grower.grow(total).ok_or(InitError::GrowFailed)?;
        // SAFETY: `grow` just handed back `total` fresh, exclusively-owned bytes at `base`.
        let table_base = unsafe { NonNull::new_unchecked(base.as_ptr().add(pad)) };
        let table = unsafe { ClassTable::from_base(table_base) };
        table.init();

        // SAFETY: `table_base + table_size` is still within the region `grow` returned.
        let first_header = unsafe { NonNull::new_unchecked(table_base.as_ptr().add(table_size)) };
        // SAFETY: `[first_header, first_header + MIN_BLOCK_SIZE)` is fresh, owned memory.
        let first = unsafe { BlockHandle::write_new(first_header, block::MIN_BLOCK_SIZE, false) };
        table.insert_front(classes::class_of(block::MIN_BLOCK_SIZE), first);

        log::debug!(
            "heap init: pad={pad} table_size={table_size} first_block={} bytes",
            block::MIN_BLOCK_SIZE
        );
        self.state = Some(HeapState {
            table,
            first,
            last: first,
        });
        Ok(())
    }

    fn state_mut(&mut self) -> &mut HeapState {
        self.state
            .as_mut()
            .expect("Heap::init must be called before using the heap")
    }

    fn state(&self) -> &HeapState {
        self.state
            .as_ref()
            .expect("Heap::init must be called before using the heap")
    }

    /// Allocates `size` payload bytes, returning an 8-aligned handle or `None`.
    ///
    /// Returns `None` if `size <= 0` or the grow primitive is exhausted.
    ///
    /// # Panics
    /// Panics if [`init`](Heap::init) has not been called successfully first.
    pub fn allocate(&mut self, size: isize) -> Option<BlockHandle> {
        if size <= 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let need = required_total_size(size as usize);
        let state = self.state_mut();
        let start_class = classes::class_of(need);

        for class in start_class..CLASSES {
            let Some(found) = placement::search(state.table, class, need, self.policy) else {
                continue;
            };
            let remainder = found.size() - need;
            if remainder <= block::MIN_BLOCK_SIZE {
                state.table.remove(class, found);
                found.set_tag(found.size(), true);
                log::trace!("allocate({size}): claimed whole {}-byte block from class {class}", found.size());
                return Some(found);
            }
            log::trace!("allocate({size}): splitting a block from class {class} for {need} bytes");
            return Some(do_split(state, found, need));
        }

        log::trace!("allocate({size}): no free block fits, growing heap by {need} bytes");
        grow_block(&mut self.grower, state, need)
    }

    /// Marks `ptr` free and returns it to the appropriate size-class list,
    /// coalescing with free neighbors first when the block is above the
    /// coalesce threshold. A no-op when `ptr` is `None`.
    ///
    /// # Panics
    /// Panics if [`init`](Heap::init) has not been called successfully first.
    pub fn free(&mut self, ptr: Option<BlockHandle>) {
        let Some(block) = ptr else { return };
        let state = self.state_mut();
        block.set_tag(block.size(), false);

        let mut class = classes::class_of(block.size());
        let target = if class > LIMIT_COALESCE {
            let (merged, last_changed) = coalesce::coalesce(state.table, block, state.first, state.last);
            if last_changed {
                state.last = merged;
            }
            class = classes::class_of(merged.size());
            merged
        } else {
            block
        };
        state.table.insert_front(class, target);
        log::trace!("free: {}-byte block inserted into class {class}", target.size());
    }

    /// Resizes the block at `ptr` to hold `size` payload bytes.
    ///
    /// Follows the spec's sentinel routing exactly:
    /// - `ptr = None, size > 0` behaves like [`allocate`](Heap::allocate).
    /// - `size = 0` behaves like [`free`](Heap::free) and returns `ptr` unchanged
    ///   (the returned handle must not be dereferenced: the block it names is freed).
    /// - Otherwise grows in place (absorbing free right neighbors) or falls back
    ///   to allocate + copy + free; shrinks in place via split.
    ///
    /// # Panics
    /// Panics if [`init`](Heap::init) has not been called successfully first.
    pub fn resize(&mut self, ptr: Option<BlockHandle>, size: isize) -> Option<BlockHandle> {
        if size == 0 {
            self.free(ptr);
            return ptr;
        }
        let Some(block) = ptr else {
            return self.allocate(size);
        };
        if size < 0 {
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let new_size = required_total_size(size as usize);
        let old_size = block.size();
        if new_size == old_size {
            return Some(block);
        }
        if new_size > old_size {
            self.grow_or_relocate(block, new_size, old_size, size)
        } else {
            self.shrink_in_place(block, new_size, old_size)
        }
    }

    fn grow_or_relocate(
        &mut self,
        block: BlockHandle,
        new_size: usize,
        old_size: usize,
        requested_payload: isize,
    ) -> Option<BlockHandle> {
        let diff = new_size - old_size;
        let state = self.state_mut();

        if simulate_absorb(state, block, diff) {
            let (consumed, absorbed_last) = commit_absorb(state, block, diff);
            let merged_size = old_size + consumed;
            block.set_tag(merged_size, true);
            if absorbed_last {
                state.last = block;
            }
            log::trace!("resize: grew in place to {merged_size} bytes");
            return Some(block);
        }

        log::trace!("resize: no room to grow in place, reallocating");
        let new_block = self.allocate(requested_payload)?;
        let payload_len = old_size - block::HF_OVERHEAD;
        // SAFETY: `block` and `new_block` are both live, non-overlapping payloads
        // of at least `payload_len` bytes (the old block's full payload).
        unsafe {
            core::ptr::copy_nonoverlapping(block.as_ptr(), new_block.as_ptr(), payload_len);
        }
        self.free(Some(block));
        Some(new_block)
    }

    fn shrink_in_place(&mut self, block: BlockHandle, new_size: usize, old_size: usize) -> Option<BlockHandle> {
        let diff = old_size - new_size;
        if diff <= block::MIN_BLOCK_SIZE {
            return Some(block);
        }
        let state = self.state_mut();
        Some(do_split(state, block, new_size))
    }

    /// Runs the integrity checker, reporting each violation to `sink` (and to
    /// the `log` crate at `warn` level). Never mutates the heap.
    ///
    /// # Panics
    /// Panics if [`init`](Heap::init) has not been called successfully first.
    pub fn check<F: FnMut(Violation)>(&self, sink: F) -> CheckSummary {
        let state = self.state();
        check::run(state.table, state.first, state.last, sink)
    }
}

/// Splits `block` at `need` bytes, unlinking it first if it was free (as when
/// called from allocate), and returns the used portion. Updates `state.last`
/// if `block` was the heap's last block.
fn do_split(state: &mut HeapState, block: BlockHandle, need: usize) -> BlockHandle {
    let was_last = block == state.last;
    let total = block.size();

    if !block.in_use() {
        state.table.remove(classes::class_of(total), block);
    }
    block.set_tag(need, true);

    let remainder_size = total - need;
    // SAFETY: `block.as_ptr() + need` is within `[block.as_ptr(), block.as_ptr() + total)`,
    // which `block` exclusively owned before this split.
    let remainder = unsafe { BlockHandle::from_payload(NonNull::new_unchecked(block.as_ptr().add(need))) };
    remainder.set_tag(remainder_size, false);
    state.table.insert_front(classes::class_of(remainder_size), remainder);

    if was_last {
        state.last = remainder;
    }
    block
}

fn grow_block<G: Grow>(grower: &mut G, state: &mut HeapState, need: usize) -> Option<BlockHandle> {
    let header_addr = grower.grow(need)?;
    // SAFETY: `grow` returned `need` fresh, exclusively-owned, 8-aligned bytes.
    let block = unsafe { BlockHandle::write_new(header_addr, need, true) };
    state.last = block;
    Some(block)
}

/// Checks (without mutating) whether absorbing free right-neighbors of
/// `block` can reach `diff` additional bytes before running off the end of
/// the heap or hitting a used block.
fn simulate_absorb(state: &HeapState, block: BlockHandle, diff: usize) -> bool {
    let mut total = 0usize;
    let mut cursor = block;
    while cursor != state.last {
        let right = cursor.right();
        if right.in_use() {
            return false;
        }
        total += right.size();
        cursor = right;
        if total >= diff {
            return true;
        }
    }
    false
}

/// Performs the absorption `simulate_absorb` already confirmed will succeed:
/// unlinks each consumed right-neighbor from its free list. May consume
/// slightly more than `diff` (the final neighbor is taken whole, never
/// re-split). Returns the total bytes consumed and whether the last consumed
/// neighbor was the heap's last block.
fn commit_absorb(state: &mut HeapState, block: BlockHandle, diff: usize) -> (usize, bool) {
    let mut total = 0usize;
    let mut cursor = block;
    loop {
        let right = cursor.right();
        total += right.size();
        state.table.remove(classes::class_of(right.size()), right);
        let was_last = right == state.last;
        cursor = right;
        if total >= diff || was_last {
            return (total, was_last);
        }
    }
}
