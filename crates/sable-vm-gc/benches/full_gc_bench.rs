//! Criterion benchmarks for the full-collection path.
//!
//! Run with: `cargo bench -p sable-vm-gc`

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use sable_vm_gc::{FullGc, GcCause, GcConfig, Heap, tags};

/// Build a heap where every third need-10 object is rooted, leaving plenty
/// of fragmentation for the slider to squeeze out.
fn fragmented_heap(regions: usize, workers: usize) -> Arc<Heap> {
    let heap = Heap::with_config(GcConfig {
        region_size_words: 1024,
        region_count: regions,
        max_workers: workers,
        parallel_fullgc_workers: workers,
        use_tlab: false,
        ..GcConfig::default()
    })
    .unwrap();
    let stack = heap.roots().register_thread();
    let per_region = 1024 / 10;
    for i in 0..regions * per_region {
        let obj = heap.allocate(9, 0, tags::OBJECT).unwrap();
        if i % 3 == 0 {
            stack.add_slot(obj);
        }
    }
    heap
}

fn bench_full_gc_single_worker(c: &mut Criterion) {
    c.bench_function("full_gc_16_regions_1_worker", |b| {
        b.iter_with_setup(
            || fragmented_heap(16, 1),
            |heap| {
                FullGc::new(&heap).do_full_gc(black_box(GcCause::AllocationFailure));
                black_box(heap.used());
            },
        );
    });
}

fn bench_full_gc_parallel(c: &mut Criterion) {
    c.bench_function("full_gc_16_regions_4_workers", |b| {
        b.iter_with_setup(
            || fragmented_heap(16, 4),
            |heap| {
                FullGc::new(&heap).do_full_gc(black_box(GcCause::AllocationFailure));
                black_box(heap.used());
            },
        );
    });
}

fn bench_idempotent_full_gc(c: &mut Criterion) {
    // Second collection over an already-compact heap: measures phase
    // overhead without any copying.
    c.bench_function("full_gc_already_compact", |b| {
        let heap = fragmented_heap(8, 1);
        FullGc::new(&heap).do_full_gc(GcCause::AllocationFailure);
        b.iter(|| {
            FullGc::new(&heap).do_full_gc(black_box(GcCause::ExplicitRequest));
            black_box(heap.used());
        });
    });
}

criterion_group!(
    benches,
    bench_full_gc_single_worker,
    bench_full_gc_parallel,
    bench_idempotent_full_gc
);
criterion_main!(benches);
