//! Exact cosine ranking throughput over a synthetic catalogue.
//! Run locally with `cargo bench --bench engine`.

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tempfile::TempDir;

use mmsr_eval::{
    Catalogue, CatalogueEntry, FeatureTable, MemoryTableProvider, Retrieval, RetrievalCache,
};

fn build_engine(items: usize, dimension: usize, dir: &TempDir) -> Retrieval {
    let rows: BTreeMap<String, Vec<f32>> = (0..items)
        .map(|i| {
            let vector: Vec<f32> = (0..dimension)
                .map(|d| ((i * 31 + d * 7) as f32 * 0.013).sin())
                .collect();
            (format!("t{i}"), vector)
        })
        .collect();
    let provider = MemoryTableProvider::new();
    provider.insert(FeatureTable::from_rows("bench", rows).unwrap());

    let catalogue = Arc::new(Catalogue::new(
        (0..items)
            .map(|i| CatalogueEntry {
                id: format!("t{i}"),
                genres: None,
            })
            .collect(),
    ));
    let cache = Arc::new(RetrievalCache::open(dir.path()).unwrap());
    Retrieval::new(Arc::new(provider), cache, catalogue, 100)
}

fn bench_cold_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_uncached");
    for &items in &[1_000usize, 5_000] {
        let dir = tempfile::tempdir().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, &items| {
            let mut query = 0usize;
            b.iter_batched(
                // Fresh engine per iteration so every query misses the cache.
                || build_engine(items, 64, &dir),
                |engine| {
                    query = (query + 1) % items;
                    engine.top_similar(&format!("t{query}"), "bench", 100).unwrap()
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

fn bench_warm_lookup(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let items = 1_000usize;
    let engine = build_engine(items, 64, &dir);
    for i in 0..items {
        engine.top_similar(&format!("t{i}"), "bench", 100).unwrap();
    }
    c.bench_function("lookup_cached", |b| {
        let mut query = 0usize;
        b.iter(|| {
            query = (query + 1) % items;
            engine.top_similar(&format!("t{query}"), "bench", 100).unwrap()
        });
    });
}

criterion_group!(benches, bench_cold_ranking, bench_warm_lookup);
criterion_main!(benches);
