mod common;

use common::FixedGrow;
use segfit_alloc::Heap;

const ONE_MIB: usize = 1024 * 1024;

fn init_heap(capacity: usize) -> Heap<FixedGrow> {
    let mut heap = Heap::new(FixedGrow::new(capacity));
    heap.init().expect("a fresh FixedGrow should supply the initial region");
    heap
}

fn payload(h: &segfit_alloc::BlockHandle) -> &mut [u8] {
    // SAFETY: the block is live and its payload is exactly `payload_len()` bytes,
    // all initialized (FixedGrow hands out zeroed memory).
    unsafe { std::slice::from_raw_parts_mut(h.as_ptr(), h.payload_len()) }
}

#[test]
fn init_then_single_allocate() {
    let mut heap = init_heap(ONE_MIB);

    let p = heap.allocate(16).expect("allocate(16) must succeed on a fresh heap");
    assert_eq!(p.total_size(), 32, "first allocation should claim the whole seed block");
    assert!(p.is_in_use());
    assert!(heap.check(|_| {}).is_clean());
}

#[test]
fn split_carves_a_free_remainder() {
    let mut heap = init_heap(ONE_MIB);

    // Consume the init-time seed block first so it can't interfere with the carve below.
    let _seed = heap.allocate(8).expect("seed block should be claimable");

    let p = heap.allocate(1024).expect("allocate(1024) should grow the heap");
    heap.free(Some(p));

    let q = heap.allocate(16).expect("allocate(16) should carve from the freed 1024-byte block");
    assert_eq!(q.as_ptr(), p.as_ptr(), "carving keeps the used portion at the original address");
    assert_eq!(q.total_size(), 32, "only the requested amount should be claimed, leaving a free remainder");
    assert!(heap.check(|_| {}).is_clean());
}

#[test]
fn coalesce_merges_free_neighbors_above_threshold() {
    let mut heap = init_heap(ONE_MIB);

    let a = heap.allocate(1024).unwrap();
    let b = heap.allocate(1024).unwrap();
    let c = heap.allocate(1024).unwrap();

    heap.free(Some(a));
    heap.free(Some(c));
    heap.free(Some(b));

    assert!(heap.check(|_| {}).is_clean());

    // The three merged blocks should now be reachable as one span starting at `a`.
    let merged = heap
        .allocate(3000)
        .expect("a single coalesced block covering all three originals should satisfy this request");
    assert_eq!(merged.as_ptr(), a.as_ptr());
}

#[test]
fn coalesce_moves_last_anchor_when_freeing_the_last_block_leftward() {
    let mut heap = init_heap(ONE_MIB);

    let a = heap.allocate(1024).unwrap();
    let b = heap.allocate(1024).unwrap();

    // `b` is the heap's last block. Freeing `a` first leaves it free but
    // un-coalesced (its right neighbor `b` is still in use). Freeing `b`
    // next merges leftward into `a` with zero rightward absorption steps,
    // which must still move the heap's last-block anchor to `a`.
    heap.free(Some(a));
    heap.free(Some(b));

    assert!(heap.check(|_| {}).is_clean());

    // `a`'s header now spans the merged region (its own original extent plus
    // `b`'s); a correct `last` anchor means the next allocation this size
    // can't satisfy must grow past that whole merged extent, not reuse stale
    // space at `b`'s old address.
    let grown = heap
        .allocate(3000)
        .expect("a block spanning the merged region should not fit, forcing growth");
    assert!(grown.as_ptr() as usize >= a.as_ptr() as usize + a.total_size());
}

#[test]
fn small_blocks_below_threshold_never_coalesce() {
    let mut heap = init_heap(ONE_MIB);

    let a = heap.allocate(8).unwrap(); // claims the seed block
    let b = heap.allocate(8).unwrap(); // class 0 is empty now, so this grows fresh

    heap.free(Some(a));
    heap.free(Some(b));
    assert!(heap.check(|_| {}).is_clean());

    // If `a` and `b` had merged into one 64-byte block, this would be satisfiable
    // from existing free space. Since class-0 blocks never coalesce, it must grow instead.
    let grown = heap.allocate(64).unwrap();
    assert_ne!(grown.as_ptr(), a.as_ptr());
    assert_ne!(grown.as_ptr(), b.as_ptr());
}

#[test]
fn resize_grows_in_place_by_absorbing_a_free_right_neighbor() {
    let mut heap = init_heap(ONE_MIB);
    let _seed = heap.allocate(8).unwrap(); // keep the tiny seed block out of the way

    let p = heap.allocate(64).unwrap();
    let q = heap.allocate(64).unwrap();
    heap.free(Some(q));

    let original_total = p.total_size();
    let grown = heap.resize(Some(p), 120).expect("resize should grow in place");

    assert_eq!(grown.as_ptr(), p.as_ptr());
    assert_eq!(grown.total_size(), original_total + q.total_size());
    assert!(heap.check(|_| {}).is_clean());

    // `q` was the heap's last block; after absorption the allocator must treat
    // `p` as last. A subsequent allocation must grow past the merged block,
    // never reuse space inside it.
    let next = heap.allocate(16).unwrap();
    assert!(next.as_ptr() as usize >= grown.as_ptr() as usize + grown.total_size());
}

#[test]
fn resize_falls_back_to_copy_when_no_room_to_grow_in_place() {
    let mut heap = init_heap(ONE_MIB);

    let p = heap.allocate(64).unwrap();
    let pattern: Vec<u8> = (0..64).map(|i| (i * 7) as u8).collect();
    payload(&p).copy_from_slice(&pattern);

    let _q = heap.allocate(64).unwrap(); // occupies p's right neighbor, blocking in-place growth

    let r = heap.resize(Some(p), 512).expect("resize should fall back to allocate + copy");
    assert_ne!(r.as_ptr(), p.as_ptr());
    assert_eq!(&payload(&r)[..64], &pattern[..]);
    assert!(!p.is_in_use(), "the original block must be returned to a free list");
    assert!(heap.check(|_| {}).is_clean());
}

#[test]
fn allocate_free_round_trip_reuses_the_same_address() {
    let mut heap = init_heap(ONE_MIB);

    let p = heap.allocate(200).unwrap();
    heap.free(Some(p));
    let q = heap.allocate(200).unwrap();

    assert_eq!(p.as_ptr(), q.as_ptr());
    assert!(heap.check(|_| {}).is_clean());
}

#[test]
fn resize_to_zero_behaves_like_free() {
    let mut heap = init_heap(ONE_MIB);

    let p = heap.allocate(64).unwrap();
    let returned = heap.resize(Some(p), 0);
    assert_eq!(returned.map(|b| b.as_ptr()), Some(p.as_ptr()));

    let q = heap.allocate(64).unwrap();
    assert_eq!(q.as_ptr(), p.as_ptr(), "the freed block should be reused");
}

#[test]
fn resize_of_none_behaves_like_allocate() {
    let mut heap = init_heap(ONE_MIB);
    let p = heap.resize(None, 64);
    assert!(p.is_some());
}

#[test]
fn zero_and_negative_sizes_never_allocate() {
    let mut heap = init_heap(ONE_MIB);
    assert!(heap.allocate(0).is_none());
    assert!(heap.allocate(-1).is_none());
}

#[test]
fn free_of_none_is_a_no_op() {
    let mut heap = init_heap(ONE_MIB);
    heap.free(None);
    assert!(heap.check(|_| {}).is_clean());
}

#[test]
fn init_fails_cleanly_when_the_grow_primitive_is_too_small() {
    // Smaller than the table + one minimum block could possibly need.
    let mut heap = Heap::new(FixedGrow::new(4));
    assert!(heap.init().is_err());
    assert!(!heap.is_initialized());
}
