//! Benchmarks for submission and end-to-end dispatch

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use taskq::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap()
}

fn bench_config() -> QueueConfig {
    QueueConfig::builder()
        .worker_threads(4)
        .idle_poll_interval(Duration::from_millis(1))
        .drain_poll_interval(Duration::from_millis(1))
        .build()
        .unwrap()
}

fn submit_only(c: &mut Criterion) {
    let rt = runtime();
    let queue = TaskQueue::new(bench_config()).unwrap();
    queue.start_on(rt.handle()).unwrap();

    c.bench_function("submit_cooperative", |b| {
        b.iter(|| {
            queue
                .submit_cooperative("noop", |n: u64| async move { black_box(n); Ok(()) }, black_box(7u64))
                .unwrap()
        });
    });

    rt.block_on(queue.shutdown());
}

fn submit_and_drain(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("submit_and_drain");

    for size in [100usize, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("cooperative", size), size, |b, &size| {
            b.iter(|| {
                let queue = TaskQueue::new(bench_config()).unwrap();
                queue.start_on(rt.handle()).unwrap();
                for i in 0..size {
                    queue
                        .submit_cooperative("noop", |n: usize| async move { black_box(n); Ok(()) }, i)
                        .unwrap();
                }
                rt.block_on(queue.shutdown())
            });
        });

        group.bench_with_input(BenchmarkId::new("blocking", size), size, |b, &size| {
            b.iter(|| {
                let queue = TaskQueue::new(bench_config()).unwrap();
                queue.start_on(rt.handle()).unwrap();
                for i in 0..size {
                    queue
                        .submit_blocking("noop", |n: usize| { black_box(n); Ok(()) }, i)
                        .unwrap();
                }
                rt.block_on(queue.shutdown())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, submit_only, submit_and_drain);
criterion_main!(benches);
