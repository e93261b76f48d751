//! Heap traffic of warmed-up scopes, measured with a counting allocator.
//!
//! Counts are per thread, so tests running in parallel do not disturb each
//! other.

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use arrpool_core::{ArenaRegistry, TypeKey};

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

struct CountingAlloc;

fn count() {
    let _ = ALLOCATIONS.try_with(|n| n.set(n.get() + 1));
}

// SAFETY: every call is forwarded unchanged to the system allocator; the
// counter is a const-initialised thread local and never allocates.
unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        count();
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        count();
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        count();
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations() -> usize {
    ALLOCATIONS.with(Cell::get)
}

/// Heap allocations made by 100 runs of `cycle` after one warm-up run.
fn steady_heap_allocations(
    registry: &mut ArenaRegistry,
    cycle: impl Fn(&mut ArenaRegistry),
) -> usize {
    cycle(registry);
    let pooled = registry.stats().allocations();
    let before = allocations();
    for _ in 0..100 {
        cycle(registry);
    }
    let heap = allocations() - before;
    assert_eq!(registry.stats().allocations(), pooled);
    heap
}

#[test]
fn views_of_any_rank_stop_allocating() {
    let shapes: [&[usize]; 5] = [
        &[16],
        &[4, 4],
        &[2, 2, 2, 2],
        &[2, 1, 2, 1, 4],
        &[1, 2, 1, 2, 1, 2, 2],
    ];
    for dims in shapes {
        let mut registry = ArenaRegistry::new();
        let heap = steady_heap_allocations(&mut registry, |registry| {
            registry.scope(|s| {
                let mut view = s.acquire_view::<f64>(dims).unwrap();
                view.fill(1.0);
            });
        });
        assert_eq!(heap, 0, "rank {}", dims.len());
    }
}

#[test]
fn owned_arrays_and_nested_scopes_stop_allocating() {
    let mut registry = ArenaRegistry::new();
    let heap = steady_heap_allocations(&mut registry, |registry| {
        registry.scope(|s| {
            let a = s.acquire_owned::<f32>(&[2, 3, 1, 2, 2]).unwrap();
            s.scope(|inner| {
                let mut b = inner.similar(&a).unwrap();
                b.copy_from_slice(&a);
                inner.zeros::<i32>(&[3, 3]).unwrap();
            })
            .unwrap();
        });
    });
    assert_eq!(heap, 0);
}

#[test]
fn wide_typed_scopes_stop_allocating() {
    let types = [
        TypeKey::of::<f64>(),
        TypeKey::of::<u16>(),
        TypeKey::of::<u32>(),
        TypeKey::of::<i16>(),
        TypeKey::of::<u64>(),
        TypeKey::of::<i8>(),
    ];
    let mut registry = ArenaRegistry::new();
    let heap = steady_heap_allocations(&mut registry, |registry| {
        registry.scope_for(&types, |s| {
            s.acquire_view::<u16>(&[4]).unwrap();
            // Unlisted: joins the scope on first use.
            s.acquire_view::<f32>(&[4]).unwrap();
            s.scope_for(&types, |inner| {
                inner.acquire_view::<i8>(&[8]).unwrap();
                inner.acquire_view::<bool>(&[2]).unwrap();
            })
            .unwrap();
        });
    });
    assert_eq!(heap, 0);
}
