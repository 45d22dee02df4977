use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use infergraph::{CpuRuntime, GraphError, PoolAllocator};

fn new_allocator() -> PoolAllocator {
    PoolAllocator::new(Arc::new(CpuRuntime))
}

#[test]
fn free_coalesces_and_reclaims_the_tail() {
    let mut pool = new_allocator();
    assert_eq!(pool.alloc(8).expect("first"), 0);
    assert_eq!(pool.alloc(8).expect("second"), 8);
    assert_eq!(pool.alloc(8).expect("third"), 16);
    assert_eq!(pool.used(), 24);
    assert_eq!(pool.peak(), 24);

    pool.free(8, 8).expect("free middle");
    pool.free(16, 8).expect("free tail");
    assert_eq!(pool.peak(), 8, "merged tail block shrinks the peak");
    assert_eq!(pool.free_block_count(), 0);
    assert_eq!(pool.used(), 8);

    // Nothing reusable remains, so the next allocation grows the tail again.
    assert_eq!(pool.alloc(16).expect("regrow"), 8);
    assert_eq!(pool.peak(), 24);
}

#[test]
fn offsets_are_always_aligned() {
    let mut pool = new_allocator();
    for size in [1usize, 3, 7, 8, 9, 23, 64, 100] {
        let offset = pool.alloc(size).expect("alloc");
        assert_eq!(offset % 8, 0, "offset {offset} for size {size}");
    }
}

#[test]
fn alignment_rounds_requests_up() {
    let mut pool = new_allocator();
    assert_eq!(pool.alloc(1).expect("one byte"), 0);
    assert_eq!(pool.alloc(1).expect("another byte"), 8);
    assert_eq!(pool.used(), 16, "both requests occupy a full alignment unit");
}

#[test]
fn first_fit_reuses_and_splits_free_blocks() {
    let mut pool = new_allocator();
    let first = pool.alloc(32).expect("first");
    let second = pool.alloc(8).expect("second");
    assert_eq!((first, second), (0, 32));

    pool.free(0, 32).expect("free the head block");
    assert_eq!(pool.free_block_count(), 1);

    // An 8-byte request takes the head of the 32-byte hole and leaves the
    // 24-byte remainder on the free list.
    assert_eq!(pool.alloc(8).expect("reuse"), 0);
    assert_eq!(pool.free_block_count(), 1);
    assert_eq!(pool.alloc(24).expect("fill the remainder"), 8);
    assert_eq!(pool.free_block_count(), 0);
    assert_eq!(pool.peak(), 40, "reuse never grew the tail");
}

#[test]
fn exact_fit_leaves_no_residual_block() {
    let mut pool = new_allocator();
    let a = pool.alloc(16).expect("a");
    let _b = pool.alloc(8).expect("b");
    pool.free(a, 16).expect("free a");
    assert_eq!(pool.alloc(16).expect("exact refit"), a);
    assert_eq!(pool.free_block_count(), 0);
}

#[test]
fn random_free_order_round_trips_to_empty() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x1f2e3d4c);
    for _ in 0..16 {
        let mut pool = new_allocator();
        let mut live: Vec<(usize, usize)> = Vec::new();
        let mut aligned_total = 0usize;
        for _ in 0..32 {
            let size = rng.gen_range(1..=256);
            let offset = pool.alloc(size).expect("plan alloc");
            live.push((offset, size));
            aligned_total += size.div_ceil(8) * 8;
        }
        assert_eq!(pool.used(), aligned_total);
        assert_eq!(
            pool.peak(),
            aligned_total,
            "without frees the peak is the running sum"
        );

        live.shuffle(&mut rng);
        for (offset, size) in live {
            pool.free(offset, size).expect("plan free");
        }
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.peak(), 0, "full coalescing reclaims the whole pool");
        assert_eq!(pool.free_block_count(), 0);
    }
}

#[test]
fn materialize_freezes_the_planner() {
    let mut pool = new_allocator();
    let offset = pool.alloc(40).expect("alloc");
    assert_eq!(offset, 0);

    let region = pool.materialize().expect("single real allocation");
    assert_eq!(region.len(), pool.peak());
    assert!(pool.is_frozen());

    assert_eq!(pool.alloc(8), Err(GraphError::AllocatorFrozen));
    assert_eq!(pool.free(0, 40), Err(GraphError::AllocatorFrozen));

    let again = pool.materialize().expect("idempotent");
    assert_eq!(again.as_ptr(), region.as_ptr());
}

#[test]
fn empty_plan_materializes_a_zero_byte_region() {
    let mut pool = new_allocator();
    let region = pool.materialize().expect("nothing planned");
    assert!(region.is_empty());
}
