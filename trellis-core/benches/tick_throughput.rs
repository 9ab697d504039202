//! Benchmark: tick cost of composite trees
//!
//! Measures one `tick()` of a root composite for growing numbers of
//! children, and the cost of a sequence handing over between children.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use trellis_core::combinators::{Parallel, Sequence, SequenceOptions};
use trellis_core::leaf::Forever;
use trellis_core::testing::MockChip;
use trellis_core::{Chip, ChipContext, Composite, Leaf, Signal, TickInfo};

fn activate<C: Chip>(chip: &mut C) {
    chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
        .expect("activate root");
}

fn bench_wide_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_parallel");

    for width in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let mut root = Composite::new(Parallel::new((0..width).map(|_| Leaf::new(Forever))));
            activate(&mut root);
            b.iter(|| {
                root.tick(black_box(TickInfo::new(16.0))).expect("tick");
            });
        });
    }

    group.finish();
}

fn bench_nested_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_parallel");

    // 10 x 10 grid of mock leaves under two levels of composites
    let mut root = Composite::new(Parallel::new((0..10).map(|_| {
        Composite::new(Parallel::new((0..10).map(|_| Leaf::new(MockChip::new()))))
    })));
    activate(&mut root);
    group.throughput(Throughput::Elements(100));
    group.bench_function("10x10", |b| {
        b.iter(|| {
            root.tick(black_box(TickInfo::new(16.0))).expect("tick");
        });
    });

    group.finish();
}

fn bench_sequence_handover(c: &mut Criterion) {
    // Every child ends on its first tick, so each tick switches children.
    let mut root = Composite::new(Sequence::with_options(
        (0..8).map(|_| Leaf::new(MockChip::new().terminate_on_tick(1, "next"))),
        SequenceOptions {
            looping: true,
            ..SequenceOptions::default()
        },
    ));
    activate(&mut root);

    c.bench_function("sequence_handover", |b| {
        b.iter(|| {
            root.tick(black_box(TickInfo::new(16.0))).expect("tick");
        });
    });
}

criterion_group!(
    benches,
    bench_wide_parallel,
    bench_nested_parallel,
    bench_sequence_handover
);
criterion_main!(benches);
