//! Basic benchmarks for the `pooled_dict` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use pooled_dict::{Dictionary, Sparse2D};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const PREFILL: u64 = 10_000;

fn prefilled() -> Dictionary<u64, u64> {
    let mut dict = Dictionary::with_capacity(usize::try_from(PREFILL).unwrap());

    for key in 0..PREFILL {
        dict.add(key, key).unwrap();
    }

    dict
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("dict_basic");

    group.bench_function("build_empty", |b| {
        b.iter(|| drop(black_box(Dictionary::<u64, u64>::new())));
    });

    group.bench_function("add_first", |b| {
        b.iter_custom(|iters| {
            let mut dicts = iter::repeat_with(Dictionary::<u64, u64>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for dict in &mut dicts {
                _ = black_box(dict.add(black_box(1), black_box(2)));
            }

            start.elapsed()
        });
    });

    group.bench_function("get_hit", |b| {
        let dict = prefilled();
        let mut key = 0;

        b.iter(|| {
            key = (key + 7919) % PREFILL;
            _ = black_box(dict.get(black_box(&key)));
        });
    });

    group.bench_function("get_miss", |b| {
        let dict = prefilled();

        b.iter(|| {
            _ = black_box(dict.get(black_box(&(PREFILL + 1))));
        });
    });

    group.bench_function("erase_then_add", |b| {
        let mut dict = prefilled();
        let mut key = 0;

        b.iter(|| {
            key = (key + 7919) % PREFILL;
            let value = dict.erase(black_box(&key)).unwrap();
            _ = black_box(dict.add(key, value));
        });
    });

    group.bench_function("iterate_all", |b| {
        let dict = prefilled();

        b.iter(|| black_box(dict.values().sum::<u64>()));
    });

    group.finish();

    let mut group = c.benchmark_group("sparse_2d_basic");

    group.bench_function("insert_remove", |b| {
        let mut matrix = Sparse2D::new(1000, 1000);
        let mut step: usize = 0;

        b.iter(|| {
            step = step.wrapping_add(7919);
            let (row, column) = (step % 1000, (step / 1000) % 1000);

            matrix.insert(black_box(row), black_box(column), step);
            _ = black_box(matrix.remove(row, column));
        });
    });

    group.bench_function("walk_row", |b| {
        let mut matrix = Sparse2D::new(10, 1000);

        for column in (0..1000).step_by(3) {
            matrix.insert(5, column, column);
        }

        b.iter(|| black_box(matrix.row(5).map(|(_, _, value)| *value).sum::<usize>()));
    });

    group.finish();
}
