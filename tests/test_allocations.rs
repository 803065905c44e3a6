//! Allocation counting: combined allocation must cost one heap allocation,
//! raw-address wrapping two.

use ownshare::{make_shared, Shared};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

struct CountingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static DEALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|c| c.set(c.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = DEALLOCATIONS.try_with(|c| c.set(c.get() + 1));
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn counts() -> (usize, usize) {
    (ALLOCATIONS.with(Cell::get), DEALLOCATIONS.with(Cell::get))
}

/// Touch every lazily initialized path (thread-locals, tracing callsites)
/// once so it does not show up in a measurement.
fn warm_up() {
    let combined = make_shared(0u8);
    let weak = combined.downgrade();
    drop(combined);
    drop(weak);
    drop(Shared::from_box(Box::new(0u8)));
}

/// Run `f` and report how many allocations and deallocations it made
fn measure<R>(f: impl FnOnce() -> R) -> (R, usize, usize) {
    warm_up();
    let (a0, d0) = counts();
    let result = f();
    let (a1, d1) = counts();
    (result, a1 - a0, d1 - d0)
}

#[test]
fn test_combined_allocation_is_single() {
    let (handle, allocs, _) = measure(|| make_shared([0u64; 8]));
    assert_eq!(allocs, 1);

    let (_, _, deallocs) = measure(move || drop(handle));
    assert_eq!(deallocs, 1);
}

#[test]
fn test_raw_wrap_is_double() {
    let (handle, allocs, _) = measure(|| Shared::from_box(Box::new([0u64; 8])));
    assert_eq!(allocs, 2);

    let (_, _, deallocs) = measure(move || drop(handle));
    assert_eq!(deallocs, 2);
}

#[test]
fn test_handles_do_not_allocate() {
    let owner = make_shared(1u32);
    let (_, allocs, deallocs) = measure(|| {
        let copy = owner.clone();
        let weak = copy.downgrade();
        let locked = weak.lock();
        drop((copy, weak, locked));
    });
    assert_eq!((allocs, deallocs), (0, 0));
}

#[test]
fn test_block_released_by_last_weak() {
    let owner = make_shared(String::new());
    let weak = owner.downgrade();

    // Empty String owns no heap buffer: only the block itself remains
    let (_, _, deallocs) = measure(move || drop(owner));
    assert_eq!(deallocs, 0);

    let (_, _, deallocs) = measure(move || drop(weak));
    assert_eq!(deallocs, 1);
}
