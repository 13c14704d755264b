//! Benchmarks for cache hit and miss latency
//!
//! These benchmarks measure the overhead the store adds around a dataset
//! computation: the hit path (lookup + copy) and the miss path (registry,
//! spawn, store, publish).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tradeboard_cache::{CacheKey, CacheStore};
use tradeboard_core::{CacheSettings, Column, Dataset, NullSink};
use std::sync::Arc;

/// Generate a shipments dataset with N rows
fn generate_dataset(rows: usize) -> Dataset {
    Dataset::new(vec![
        Column::text("exporter", (0..rows).map(|i| Some(format!("exporter_{}", i % 50))).collect()),
        Column::numeric("kgs", (0..rows).map(|i| Some(i as f64 * 1.5)).collect()),
    ])
    .unwrap()
}

fn store() -> CacheStore<String> {
    CacheStore::new(
        CacheSettings {
            max_entries: 10_000,
            max_total_size_bytes: usize::MAX,
            ttl_secs: 3600,
            compute_timeout_secs: None,
        },
        Arc::new(NullSink),
    )
}

/// Benchmark: warm cache lookups (100, 1000, 10000 rows)
fn bench_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_hit");

    for rows in [100, 1_000, 10_000].iter() {
        let store = store();
        let key = CacheKey::new(format!("upload-{}", rows), "contract", "pipeline");
        let dataset = generate_dataset(*rows);

        // Prime cache
        runtime.block_on(async {
            let dataset = dataset.clone();
            store
                .get_or_compute(&key, move || async move { Ok::<_, String>(dataset) })
                .await
                .unwrap();
        });

        let (store, key, dataset) = (&store, &key, &dataset);
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.to_async(&runtime).iter(move || async move {
                let dataset = dataset.clone();
                black_box(
                    store
                        .get_or_compute(key, move || async move { Ok::<_, String>(dataset) })
                        .await
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

/// Benchmark: cold cache (every call computes and stores)
fn bench_miss(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_miss");
    let dataset = generate_dataset(1_000);
    let store = store();
    let (store, dataset) = (&store, &dataset);

    group.bench_function("compute_and_store", |b| {
        b.to_async(&runtime).iter(move || async move {
            // Clear the entry so every iteration takes the miss path
            store.invalidate_all();
            let key = CacheKey::new("upload", "contract", "pipeline");
            let dataset = dataset.clone();
            black_box(
                store
                    .get_or_compute(&key, move || async move { Ok::<_, String>(dataset) })
                    .await
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_hit, bench_miss);
criterion_main!(benches);
