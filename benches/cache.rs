//! Benchmarks for the LRU cache and list parsing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mapkeeper::list::{finish_list, parse_list, ListCursor};
use mapkeeper::{LruHash, RadixTree};
use std::time::{Duration, Instant};

fn benchmark_lru_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_insert");
    let now = Instant::now();

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut cache = LruHash::new(size, None);
                // Twice the capacity so half the inserts evict
                for i in 0..size * 2 {
                    cache.insert(black_box(i as u64), i, now, None);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_lru_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_lookup");
    let now = Instant::now();

    for (name, max_age) in [("lru", None), ("ttl", Some(Duration::from_secs(60)))] {
        let mut cache = LruHash::new(10000, max_age);
        for i in 0..10000u64 {
            cache.insert(i, i, now, None);
        }

        group.bench_function(name, |b| {
            let mut key = 0u64;
            b.iter(|| {
                key = (key + 7919) % 10000;
                black_box(cache.lookup(&key, now).is_some());
            });
        });
    }

    group.finish();
}

fn ip_list(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("10.{}.{}.0/24 # net {}\n", (i >> 8) & 0xff, i & 0xff, i))
        .collect()
}

fn benchmark_parse_radix(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_radix_list");

    for lines in [1000, 10000].iter() {
        let source = ip_list(*lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &source, |b, source| {
            b.iter(|| {
                let mut tree = RadixTree::new();
                let mut cursor = ListCursor::new();
                for chunk in source.as_bytes().chunks(4096) {
                    parse_list(chunk, &mut cursor, |key, _| {
                        tree.add_iplist(key);
                    });
                }
                finish_list(&mut cursor, |key, _| {
                    tree.add_iplist(key);
                });
                black_box(tree.len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lru_insert,
    benchmark_lru_lookup,
    benchmark_parse_radix
);
criterion_main!(benches);
