//! Allocation workloads
//!
//! Each iteration copies the corpus into five boxed strings held in a nested
//! vector, so the timing is dominated by allocator traffic.

use std::hint::black_box;
use sweepbench_core::AllocatorDef;

const COPIES_PER_ITERATION: usize = 5;

fn system(corpus: &str, iterations: usize) -> usize {
    let mut outer: Vec<Vec<Box<str>>> = Vec::new();
    for _ in 0..iterations {
        let mut inner = Vec::new();
        for _ in 0..COPIES_PER_ITERATION {
            inner.push(Box::<str>::from(corpus));
        }
        outer.push(inner);
    }
    black_box(&outer);
    outer.iter().map(Vec::len).sum()
}

fn presized(corpus: &str, iterations: usize) -> usize {
    let mut outer: Vec<Vec<Box<str>>> = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let mut inner = Vec::with_capacity(COPIES_PER_ITERATION);
        for _ in 0..COPIES_PER_ITERATION {
            inner.push(Box::<str>::from(corpus));
        }
        outer.push(inner);
    }
    black_box(&outer);
    outer.iter().map(Vec::len).sum()
}

inventory::submit! {
    AllocatorDef {
        id: "system",
        name: "System allocator, growing vectors",
        order: 0,
        run: system,
    }
}

inventory::submit! {
    AllocatorDef {
        id: "presized",
        name: "System allocator, presized vectors",
        order: 1,
        run: presized,
    }
}
