//! Search and bulk-mutation benchmarks.
//!
//! Run with: cargo bench -p noema-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use noema_core::bloom::CountingBloomFilter;
use noema_core::{CacheStrategy, Config, ContentBlock, Core, Entity, SearchMode, SearchRequest};
use tempfile::TempDir;

fn bench_parse_query(c: &mut Criterion) {
    let queries = [
        "climb",
        "alice bob carol",
        "\"exact phrase\"",
        "rust async runtime tokio",
    ];

    c.bench_function("parse_query", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(noema_core::search::parse_query(q));
            }
        })
    });
}

fn bench_search_fingerprint(c: &mut Criterion) {
    c.bench_function("search_fingerprint", |b| {
        b.iter(|| {
            black_box(noema_core::search::fingerprint("climb", 10, None, SearchMode::Auto));
        })
    });
}

fn bench_bloom_add_contains(c: &mut Criterion) {
    c.bench_function("bloom_add_then_contains_10k", |b| {
        b.iter(|| {
            let mut bloom = CountingBloomFilter::new(10_000, 0.01);
            for i in 0..10_000 {
                bloom.add(&format!("entity-{i}"));
            }
            for i in 0..10_000 {
                black_box(bloom.contains(&format!("entity-{i}")));
            }
        })
    });
}

fn search_request(query: &str) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        limit: 20,
        context: None,
        mode: SearchMode::Auto,
        content_types: None,
        intent: None,
    }
}

fn open_core(strategy: CacheStrategy) -> (Core, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db_path = dir.path().join("bench.db");
    config.cache_strategy = strategy;
    (Core::open(config).unwrap(), dir)
}

fn seed(core: &Core, n: usize) {
    let entities: Vec<Entity> = (0..n)
        .map(|i| {
            Entity::new(
                format!("entity-{i}"),
                "benchmark",
                vec![ContentBlock::Text { text: format!("climbing route number {i} in the alps") }],
            )
        })
        .collect();
    core.create_entities(entities).unwrap();
}

fn bench_bulk_create_entities(c: &mut Criterion) {
    c.bench_function("bulk_create_entities_2000", |b| {
        b.iter_batched(
            || open_core(CacheStrategy::Lru),
            |(core, _dir)| {
                seed(&core, 2_000);
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_search_cold_cache(c: &mut Criterion) {
    let (core, _dir) = open_core(CacheStrategy::Lru);
    seed(&core, 5_000);

    c.bench_function("search_5000_entities_cold", |b| {
        b.iter(|| {
            black_box(core.search_nodes(search_request("climbing")).unwrap());
        })
    });
}

fn bench_search_warm_cache(c: &mut Criterion) {
    let (core, _dir) = open_core(CacheStrategy::Lru);
    seed(&core, 5_000);
    core.search_nodes(search_request("climbing")).unwrap();

    c.bench_function("search_5000_entities_warm", |b| {
        b.iter(|| {
            black_box(core.search_nodes(search_request("climbing")).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_parse_query,
    bench_search_fingerprint,
    bench_bloom_add_contains,
    bench_bulk_create_entities,
    bench_search_cold_cache,
    bench_search_warm_cache,
);
criterion_main!(benches);
