//! Covers the four request-validation end-to-end scenarios.

use std::path::PathBuf;
use std::sync::Arc;

use epimatch_core::bulk::collaborators::test_support::{NoopRenameActor, StaticSubtitleExtractor};
use epimatch_core::bulk::BulkOrchestrator;
use epimatch_core::config::ConfigurationEngine;
use epimatch_core::embeddings::provider::test_support::DeterministicProvider;
use epimatch_core::index::test_support::InMemoryIndexStore;
use epimatch_core::progress::ProgressTracker;
use epimatch_core::types::{BulkOptions, BulkPhase, BulkRequest, FileStatus};
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

fn build_orchestrator() -> (BulkOrchestrator, tempfile::NamedTempFile) {
    let store = Arc::new(InMemoryIndexStore::new());
    let provider = Arc::new(DeterministicProvider::default());
    let engine = Arc::new(IdentificationEngine::new(store, provider));
    let extractor = Arc::new(StaticSubtitleExtractor::new());
    let renamer = Arc::new(NoopRenameActor);

    let config_file = tempfile::NamedTempFile::new().expect("config file");
    std::fs::write(config_file.path(), BASE_CONFIG).expect("write config");
    let config_engine = Arc::new(ConfigurationEngine::new(config_file.path()));
    config_engine.load().expect("load config");

    let progress = Arc::new(ProgressTracker::new());
    (BulkOrchestrator::new(engine, extractor, renamer, config_engine, progress), config_file)
}

/// Scenario 1: a single non-existent path with `continueOnError = true`
/// still terminates `Failed` (all files failed) with one `FileNotFound`
/// result, not an aborted validation.
#[tokio::test]
async fn nonexistent_single_path_with_continue_on_error_yields_failed_phase() {
    let (orchestrator, _config_file) = build_orchestrator();
    let request = BulkRequest {
        request_id: "scenario-1".to_string(),
        paths: vec![PathBuf::from("/nope.mkv")],
        options: BulkOptions { continue_on_error: true, ..BulkOptions::default() },
    };

    let outcome = orchestrator.process(request).await.expect("validation must pass");
    assert_eq!(outcome.phase, BulkPhase::Failed);
    assert_eq!(outcome.total_files, 1);
    assert_eq!(outcome.file_results.len(), 1);
    assert_eq!(outcome.file_results[0].status, FileStatus::Failed);
    assert!(outcome.file_results[0].error.as_deref().unwrap_or_default().contains("File not found"));
}

/// Scenario 2: duplicate normalized paths fail validation before any
/// processing happens.
#[tokio::test]
async fn duplicate_paths_fail_validation() {
    let (orchestrator, _config_file) = build_orchestrator();
    let path = PathBuf::from("/tmp/duplicate.mkv");
    let request = BulkRequest {
        request_id: "scenario-2".to_string(),
        paths: vec![path.clone(), path],
        options: BulkOptions::default(),
    };

    let err = orchestrator.process(request).await.expect_err("duplicate paths must be rejected");
    assert!(err.to_string().contains("Duplicate path specified"));
}

/// Scenario 3: `maxConcurrency = 0` fails validation with the exact
/// message.
#[tokio::test]
async fn zero_max_concurrency_fails_validation() {
    let (orchestrator, _config_file) = build_orchestrator();
    let request = BulkRequest {
        request_id: "scenario-3".to_string(),
        paths: vec![PathBuf::from("/tmp/whatever.mkv")],
        options: BulkOptions { max_concurrency: 0, ..BulkOptions::default() },
    };

    let err = orchestrator.process(request).await.expect_err("zero concurrency must be rejected");
    assert!(err.to_string().contains("Max concurrency must be greater than zero"));
}

/// Scenario 4: a progress-reporting interval below 100ms fails validation
/// with the exact message.
#[tokio::test]
async fn short_progress_interval_fails_validation() {
    let (orchestrator, _config_file) = build_orchestrator();
    let request = BulkRequest {
        request_id: "scenario-4".to_string(),
        paths: vec![PathBuf::from("/tmp/whatever.mkv")],
        options: BulkOptions { progress_interval_ms: 50, ..BulkOptions::default() },
    };

    let err = orchestrator.process(request).await.expect_err("short interval must be rejected");
    assert!(err.to_string().contains("at least 100ms"));
}
