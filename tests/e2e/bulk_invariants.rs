//! General invariants and laws from the testable-properties section:
//! strictly serial processing at `batchSize=1, maxConcurrency=1`, and the
//! idempotent-migration law.

use std::path::PathBuf;
use std::sync::Arc;

use epimatch_core::bulk::collaborators::test_support::{NoopRenameActor, StaticSubtitleExtractor};
use epimatch_core::bulk::BulkOrchestrator;
use epimatch_core::config::ConfigurationEngine;
use epimatch_core::embeddings::provider::test_support::DeterministicProvider;
use epimatch_core::index::migration;
use epimatch_core::index::test_support::InMemoryIndexStore;
use epimatch_core::index::{IndexStore, SearchFilter};
use epimatch_core::progress::ProgressTracker;
use epimatch_core::types::{BulkOptions, BulkPhase, BulkRequest, IndexEntry, SubtitleSourceFormat};
use epimatch_core::IdentificationEngine;

const BASE_CONFIG: &str = r#"{
    "version": "1.0",
    "matchingStrategy": "embedding",
    "matchingThresholds": {
        "Text": {"matchConfidence": 0.75, "renameConfidence": 0.85, "embedSimilarity": 0.5, "fuzzyHashSimilarity": 70.0}
    },
    "maxConcurrency": 4,
    "filenamePatterns": {"primaryPattern": "{series}", "fallbackPatterns": []}
}"#;

/// `batchSize=1, maxConcurrency=1` processes strictly serially; discovered
/// file order is preserved in `file_results`.
#[tokio::test]
async fn serial_processing_preserves_discovery_order() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut extractor = StaticSubtitleExtractor::new();
    let mut paths = Vec::new();
    for i in 0..5 {
        let path = dir.path().join(format!("{i:02}_episode.mkv"));
        std::fs::write(&path, b"").expect("touch file");
        extractor = extractor.with_text(&path, format!("episode {i} transcript"));
        paths.push(path);
    }

    let store = Arc::new(InMemoryIndexStore::new());
    let provider = Arc::new(DeterministicProvider::default());
    let engine = Arc::new(IdentificationEngine::new(store, provider));
    let extractor = Arc::new(extractor);
    let renamer = Arc::new(NoopRenameActor);

    let config_file = tempfile::NamedTempFile::new().expect("config file");
    std::fs::write(config_file.path(), BASE_CONFIG).expect("write config");
    let config_engine = Arc::new(ConfigurationEngine::new(config_file.path()));
    config_engine.load().expect("load config");

    let progress = Arc::new(ProgressTracker::new());
    let orchestrator = BulkOrchestrator::new(engine, extractor, renamer, config_engine, progress);

    let request = BulkRequest {
        request_id: "serial-order".to_string(),
        paths: vec![dir.path().to_path_buf()],
        options: BulkOptions { batch_size: 1, max_concurrency: 1, ..BulkOptions::default() },
    };

    let outcome = orchestrator.process(request).await.expect("process");
    assert_eq!(outcome.phase, BulkPhase::Completed);
    assert_eq!(outcome.file_results.len(), 5);

    let names: Vec<String> =
        outcome.file_results.iter().map(|r| r.file_path.file_name().unwrap().to_string_lossy().into_owned()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted, "serial batches of size 1 must preserve discovery order");
}

fn fixture_entry_without_embedding(series: &str, episode: u32) -> IndexEntry {
    let clean_text = format!("{series} episode {episode} transcript body");
    IndexEntry {
        id: uuid::Uuid::new_v4(),
        series: series.to_string(),
        season: 1,
        episode,
        episode_name: None,
        clean_text: clean_text.clone(),
        source_format: SubtitleSourceFormat::Text,
        ctph_hash: epimatch_core::hash::CtphFingerprint::compute(&clean_text).to_string(),
        embedding: None,
    }
}

/// Running the embedding backfill twice over the same store is a no-op the
/// second time: row count and every embedding's bytes stay unchanged.
#[tokio::test]
async fn migration_backfill_is_idempotent() {
    let store = InMemoryIndexStore::new();
    for episode in 1..=10 {
        store.insert(fixture_entry_without_embedding("Idempotent Show", episode)).await.expect("seed insert");
    }

    let provider = Arc::new(DeterministicProvider::default());
    let first_report = migration::run(&store, provider.clone(), 4).await.expect("first run");
    assert_eq!(first_report.rows_migrated, 10);
    assert_eq!(migration::pending_count(&store, None).await.expect("pending after first run"), 0);

    let row_count_before = store.count().await.expect("count before second run");
    let entries_before = store.scan_for_fuzzy(&SearchFilter::default()).await.expect("scan before second run");

    let second_report = migration::run(&store, provider, 4).await.expect("second run");
    assert_eq!(second_report.rows_migrated, 0, "a fully-migrated store has nothing left to backfill");
    assert_eq!(second_report.batches_processed, 0);

    let row_count_after = store.count().await.expect("count after second run");
    assert_eq!(row_count_before, row_count_after);

    let entries_after = store.scan_for_fuzzy(&SearchFilter::default()).await.expect("scan after second run");
    for before in &entries_before {
        let after = entries_after.iter().find(|e| e.id == before.id).expect("row must still exist");
        assert_eq!(
            before.embedding.as_ref().map(epimatch_core::types::Embedding::to_bytes),
            after.embedding.as_ref().map(epimatch_core::types::Embedding::to_bytes),
            "embedding bytes must be unchanged by a no-op second migration run"
        );
    }
}
