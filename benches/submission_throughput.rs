//! Benchmarks for submission and dispatch overhead

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use thread_terminal::prelude::*;

fn terminal(pool_size: usize) -> Terminal {
    Terminal::new(
        Config::builder()
            .name("bench")
            .pool_size(pool_size)
            .keep_alive(None)
            .build()
            .unwrap(),
    )
    .unwrap()
}

fn bench_usual_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("usual_batch");

    for workers in [1, 4, 8].iter() {
        let terminal = terminal(*workers);
        group.bench_with_input(BenchmarkId::new("workers", workers), workers, |b, _| {
            b.iter(|| {
                let handles: Vec<_> = (0..1_000)
                    .map(|i| {
                        terminal
                            .submit(move || black_box(i * 2), "usual", Priority::LOW, false)
                            .unwrap()
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .sum::<i32>()
            });
        });
        terminal.shutdown();
        terminal.await_termination(Duration::from_secs(10));
    }

    group.finish();
}

fn bench_exclusive_share(c: &mut Criterion) {
    let mut group = c.benchmark_group("exclusive_share");
    let terminal = terminal(8);

    // One exclusive task every `every` submissions.
    for every in [1_000, 100, 10].iter() {
        group.bench_with_input(BenchmarkId::new("every", every), every, |b, &every| {
            b.iter(|| {
                let handles: Vec<_> = (0..1_000)
                    .map(|i| {
                        terminal
                            .submit(
                                move || black_box(i + 1),
                                "mixed",
                                Priority::HIGH,
                                i % every == 0,
                            )
                            .unwrap()
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
    terminal.shutdown();
    terminal.await_termination(Duration::from_secs(10));
}

fn bench_snapshot(c: &mut Criterion) {
    let terminal = terminal(2);
    for i in 0..100 {
        terminal
            .submit(move || i, "warmup", Priority::LOW, false)
            .unwrap()
            .join()
            .unwrap();
    }

    c.bench_function("snapshot", |b| {
        b.iter(|| black_box(terminal.snapshot()));
    });

    terminal.shutdown();
    terminal.await_termination(Duration::from_secs(10));
}

criterion_group!(
    benches,
    bench_usual_batch,
    bench_exclusive_share,
    bench_snapshot
);
criterion_main!(benches);
