//! Benchmarks `TursoStorage::search`'s brute-force cosine scan across
//! corpus sizes, with and without the redb read-cache fronting it.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use epimatch_core::embeddings::provider::test_support::deterministic_embedding;
use epimatch_core::index::{IndexStore, SearchFilter};
use epimatch_core::types::{IndexEntry, SubtitleSourceFormat};
use epimatch_storage_redb::CachingIndexStore;
use epimatch_storage_turso::TursoStorage;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn fixture_entry(series: &str, episode: u32) -> IndexEntry {
    let clean_text = format!("{series} episode {episode} transcript body text");
    IndexEntry {
        id: Uuid::new_v4(),
        series: series.to_string(),
        season: 1,
        episode,
        episode_name: None,
        clean_text: clean_text.clone(),
        source_format: SubtitleSourceFormat::Text,
        ctph_hash: "3::".to_string(),
        embedding: Some(deterministic_embedding(&clean_text)),
    }
}

async fn seeded_store(count: usize) -> (Arc<TursoStorage>, TempDir, Uuid) {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("bench.db");
    let storage = TursoStorage::connect(&format!("file:{}", db_path.display()), "")
        .await
        .expect("connect");
    let mut first_id = Uuid::nil();
    for i in 0..count {
        let entry = fixture_entry("Bench Show", i as u32);
        if i == 0 {
            first_id = entry.id;
        }
        storage.insert(entry).await.expect("insert");
    }
    (Arc::new(storage), temp_dir, first_id)
}

fn bench_direct_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("cosine_search_direct");

    for &size in &[100usize, 1_000, 5_000] {
        let (storage, _temp_dir, _first_id) = rt.block_on(seeded_store(size));
        let query = deterministic_embedding("query transcript text");
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let hits = storage
                    .search(black_box(&query), 10, 0.0, &SearchFilter::default())
                    .await
                    .expect("search");
                black_box(hits);
            });
        });
    }
    group.finish();
}

fn bench_cached_point_lookup(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("cached_point_lookup");

    let (storage, _temp_dir, entry_id) = rt.block_on(seeded_store(1_000));

    let cache_dir = TempDir::new().expect("cache dir");
    let cached = CachingIndexStore::open(cache_dir.path().join("cache.redb"), storage).expect("open cache");

    group.bench_function("repeated_get", |b| {
        b.to_async(&rt).iter(|| async {
            let entry = cached.get(black_box(entry_id)).await.expect("get");
            black_box(entry);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_direct_search, bench_cached_point_lookup);
criterion_main!(benches);
