//! Cost of scheduling and collecting background computations

use bginit::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn single_task_owned_pool(c: &mut Criterion) {
    c.bench_function("task_owned_pool", |b| {
        b.iter(|| {
            let handle = TaskHandle::new(|| Ok::<_, BoxError>(black_box(21) * 2));
            black_box(handle.get().unwrap())
        });
    });
}

fn single_task_shared_pool(c: &mut Criterion) {
    let pool = Arc::new(CpuPool::with_threads(2).unwrap());

    c.bench_function("task_shared_pool", |b| {
        b.iter(|| {
            let handle = TaskHandle::with_pool(|| Ok::<_, BoxError>(black_box(21) * 2), pool.clone());
            black_box(handle.get().unwrap())
        });
    });
}

fn aggregator_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregator_fan_out");

    for children in [1usize, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(children), children, |b, &children| {
            b.iter(|| {
                let agg = Aggregator::new();
                for i in 0..children {
                    agg.add_child(format!("c{i}"), TaskHandle::new(move || Ok::<_, BoxError>(i)))
                        .unwrap();
                }
                black_box(agg.get().unwrap().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, single_task_owned_pool, single_task_shared_pool, aggregator_fan_out);
criterion_main!(benches);
