//! Benchmarks the bulk orchestrator's end-to-end per-batch throughput
//! against an in-memory index and deterministic collaborators, varying
//! batch size and concurrency.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use epimatch_core::bulk::collaborators::test_support::{NoopRenameActor, StaticSubtitleExtractor};
use epimatch_core::bulk::BulkOrchestrator;
use epimatch_core::config::ConfigurationEngine;
use epimatch_core::embeddings::provider::test_support::DeterministicProvider;
use epimatch_core::index::test_support::InMemoryIndexStore;
use epimatch_core::progress::ProgressTracker;
use epimatch_core::types::{BulkOptions, BulkRequest};
use epimatch_core::IdentificationEngine;
use tempfile::NamedTempFile;
use tokio::runtime::Runtime;

const CONFIG_JSON: &str = r#"{
    "version": "1.0",
    "matchingStrategy": "embedding",
    "matchingThresholds": {
        "Text": {"matchConfidence": 0.75, "renameConfidence": 0.85, "embedSimilarity": 0.5, "fuzzyHashSimilarity": 70.0}
    },
    "maxConcurrency": 8,
    "filenamePatterns": {"primaryPattern": "{series}", "fallbackPatterns": []}
}"#;

fn build_fixture_dir(file_count: usize) -> (tempfile::TempDir, StaticSubtitleExtractor) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut extractor = StaticSubtitleExtractor::new();
    for i in 0..file_count {
        let path = dir.path().join(format!("episode_{i}.mkv"));
        std::fs::write(&path, b"").expect("touch file");
        extractor = extractor.with_text(&path, format!("transcript body for episode {i}"));
    }
    (dir, extractor)
}

fn bench_bulk_process(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("bulk_process");
    group.sample_size(10);

    for &(batch_size, concurrency) in &[(10usize, 2usize), (50, 4), (50, 8)] {
        let label = format!("batch{batch_size}_conc{concurrency}");
        group.bench_with_input(BenchmarkId::from_parameter(label), &(batch_size, concurrency), |b, &(batch_size, concurrency)| {
            b.to_async(&rt).iter(|| async move {
                let (dir, extractor) = build_fixture_dir(100);
                let store = Arc::new(InMemoryIndexStore::new());
                let provider = Arc::new(DeterministicProvider::default());
                let engine = Arc::new(IdentificationEngine::new(store, provider));
                let extractor = Arc::new(extractor);
                let renamer = Arc::new(NoopRenameActor);

                let config_file = NamedTempFile::new().expect("config file");
                std::fs::write(config_file.path(), CONFIG_JSON).expect("write config");
                let config_engine = Arc::new(ConfigurationEngine::new(config_file.path()));
                config_engine.load().expect("load config");

                let progress = Arc::new(ProgressTracker::new());
                let orchestrator = BulkOrchestrator::new(engine, extractor, renamer, config_engine, progress);

                let options = BulkOptions {
                    batch_size,
                    max_concurrency: concurrency,
                    progress_interval_ms: 1_000,
                    max_errors_before_abort: None,
                    file_timeout: Duration::from_secs(30),
                    recursive: true,
                    max_depth: None,
                    include_exts: Vec::new(),
                    exclude_exts: Vec::new(),
                    continue_on_error: true,
                    create_backups: false,
                    force_gc: false,
                };
                let request = BulkRequest {
                    request_id: "bench".to_string(),
                    paths: vec![dir.path().to_path_buf()],
                    options,
                };
                let outcome = orchestrator.process(request).await.expect("process");
                black_box(outcome);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bulk_process);
criterion_main!(benches);
