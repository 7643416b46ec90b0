//! Bulk orchestration: validation, streaming discovery, batched bounded-
//! concurrency processing, retry, progress, and cancellation (§4.2, §5).

pub mod collaborators;
pub mod filename;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{info, warn};

use crate::config::ConfigurationEngine;
use crate::discovery;
use crate::error::{BulkErrorKind, Error, Result};
use crate::identify::IdentificationEngine;
use crate::progress::ProgressTracker;
use crate::text::normalize::clean_text;
use crate::types::{
    BulkOptions, BulkPhase, BulkRequest, FileProcessingResult, FileStatus, Progress, QuerySubtitle,
};

pub use collaborators::{ExtractedSubtitle, RenameActor, RenameOutcome, SubtitleExtractor};

/// Inter-retry backoff per §7: 1s, 2s, 4s for up to three retries of a
/// retryable per-file error.
const RETRY_BACKOFFS_MS: [u64; 3] = [1_000, 2_000, 4_000];
const MAX_RETRIES: u32 = 3;

/// Aggregated outcome of one `process` call.
#[derive(Debug, Clone)]
pub struct BulkRunOutcome {
    pub request_id: String,
    pub phase: BulkPhase,
    pub total_files: usize,
    pub file_results: Vec<FileProcessingResult>,
    pub progress: Progress,
}

enum AttemptOutcome {
    Success(FileProcessingResult),
    Fatal(BulkErrorKind, String),
}

/// Drives the end-to-end bulk pipeline: `validate` → `Discovery` →
/// `Processing`, reporting through a shared [`ProgressTracker`] and
/// respecting per-request cancellation handles.
pub struct BulkOrchestrator {
    engine: Arc<IdentificationEngine>,
    extractor: Arc<dyn SubtitleExtractor>,
    renamer: Arc<dyn RenameActor>,
    config_engine: Arc<ConfigurationEngine>,
    progress: Arc<ProgressTracker>,
    cancellations: AsyncMutex<HashMap<String, Arc<AtomicBool>>>,
}

impl BulkOrchestrator {
    #[must_use]
    pub fn new(
        engine: Arc<IdentificationEngine>,
        extractor: Arc<dyn SubtitleExtractor>,
        renamer: Arc<dyn RenameActor>,
        config_engine: Arc<ConfigurationEngine>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            engine,
            extractor,
            renamer,
            config_engine,
            progress,
            cancellations: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Validate a request's options and paths per §3's `BulkRequest`/
    /// `BulkOptions` bounds and §4.2's validation rules / §8's literal
    /// scenarios 2-4.
    ///
    /// Checks path existence as one of the validation rules: per §4.2, "if
    /// `continueOnError` and only `FileNotFound` validation errors exist,
    /// proceed; otherwise return failed validation" — a missing path alone
    /// is forgiven only when `continueOnError` is set, while every other
    /// violation (malformed options, duplicate paths, unsupported
    /// extensions) always fails validation regardless of `continueOnError`.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::InvalidInput)` with the first violation's exact
    /// message.
    pub fn validate(&self, request: &BulkRequest) -> Result<()> {
        if request.request_id.trim().is_empty() {
            return Err(Error::InvalidInput("Request id must not be empty".to_string()));
        }
        if request.paths.is_empty() {
            return Err(Error::InvalidInput("At least one path must be specified".to_string()));
        }

        let mut seen = HashSet::new();
        for path in &request.paths {
            if !seen.insert(path) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate path specified: {}",
                    path.display()
                )));
            }
        }

        let options = &request.options;

        if options.max_concurrency == 0 {
            return Err(Error::InvalidInput("Max concurrency must be greater than zero".to_string()));
        }
        let max_allowed_concurrency = 4 * std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        if options.max_concurrency > max_allowed_concurrency {
            return Err(Error::InvalidInput(format!(
                "Max concurrency must not exceed {max_allowed_concurrency} (4x available cores)"
            )));
        }

        if options.batch_size == 0 {
            return Err(Error::InvalidInput("Batch size must be greater than zero".to_string()));
        }
        if options.batch_size > 10_000 {
            return Err(Error::InvalidInput("Batch size must not exceed 10000".to_string()));
        }

        if options.progress_interval_ms < 100 {
            return Err(Error::InvalidInput(
                "Progress reporting interval must be at least 100ms".to_string(),
            ));
        }
        if options.progress_interval_ms > 60_000 {
            return Err(Error::InvalidInput(
                "Progress reporting interval must be at most 60000ms".to_string(),
            ));
        }

        if let Some(0) = options.max_errors_before_abort {
            return Err(Error::InvalidInput(
                "Max errors before abort must be at least 1".to_string(),
            ));
        }

        if options.file_timeout < Duration::from_secs(1) || options.file_timeout > Duration::from_secs(3600) {
            return Err(Error::InvalidInput(
                "File timeout must be between 1 second and 1 hour".to_string(),
            ));
        }

        for ext in options.include_exts.iter().chain(options.exclude_exts.iter()) {
            if !crate::is_supported_video_extension(ext) {
                return Err(Error::InvalidInput(format!(
                    "Unsupported video extension in include/exclude list: {ext}"
                )));
            }
        }

        let missing: Vec<&PathBuf> = request.paths.iter().filter(|p| !p.exists()).collect();
        if !missing.is_empty() {
            if options.continue_on_error {
                return Ok(());
            }
            return Err(Error::InvalidInput(format!("File not found: {}", missing[0].display())));
        }

        Ok(())
    }

    /// Trip the cancellation handle for `request_id`, if a run is in
    /// flight. No-op (not an error) for an unknown or already-finished
    /// request id.
    pub async fn cancel(&self, request_id: &str) {
        if let Some(flag) = self.cancellations.lock().await.get(request_id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Current progress snapshot for an in-flight or just-finished request.
    #[must_use]
    pub fn progress(&self, request_id: &str) -> Option<Progress> {
        self.progress.progress(request_id)
    }

    /// Discover the file count a request would process, without running
    /// identification. Useful for a CLI's pre-flight estimate.
    ///
    /// # Errors
    ///
    /// Propagates validation failures.
    pub fn estimate(&self, request: &BulkRequest) -> Result<usize> {
        self.validate(request)?;
        let cancelled = Arc::new(AtomicBool::new(false));
        Ok(self.resolve_worklist(&request.paths, &request.options, &cancelled)?.len())
    }

    fn resolve_worklist(
        &self,
        paths: &[PathBuf],
        options: &BulkOptions,
        cancelled: &Arc<AtomicBool>,
    ) -> Result<Vec<PathBuf>> {
        let mut worklist = Vec::new();
        for path in paths {
            if path.is_dir() {
                let found = discovery::discover_files(std::slice::from_ref(path), options, cancelled)?;
                worklist.extend(found);
            } else {
                // A literal file reference, whether it exists or not; a
                // missing file surfaces as a per-file FileNotFound outcome
                // during processing rather than aborting discovery.
                worklist.push(path.clone());
            }
        }
        Ok(worklist)
    }

    /// Run the full pipeline for `request`. Never returns `Err` for
    /// per-file problems — those land in the returned `file_results`; only
    /// request-level validation failures short-circuit with `Err`.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::InvalidInput)` if `validate` rejects the request.
    pub async fn process(&self, request: BulkRequest) -> Result<BulkRunOutcome> {
        self.validate(&request)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancellations
            .lock()
            .await
            .insert(request.request_id.clone(), Arc::clone(&cancelled));

        self.progress.initialize(&request.request_id, 0, &request.options);
        self.progress.set_phase(&request.request_id, BulkPhase::Validating)?;
        self.progress.set_phase(&request.request_id, BulkPhase::Discovery)?;

        let worklist = match self.resolve_worklist(&request.paths, &request.options, &cancelled) {
            Ok(w) => w,
            Err(Error::OperationCancelled) => {
                self.progress.mark_completed(&request.request_id, BulkPhase::Cancelled)?;
                return Ok(self.finish(&request.request_id, BulkPhase::Cancelled, 0, Vec::new()).await);
            }
            Err(e) => return Err(e),
        };

        info!(request_id = %request.request_id, files = worklist.len(), "starting bulk processing");
        self.progress.set_total(&request.request_id, worklist.len())?;
        self.progress.set_phase(&request.request_id, BulkPhase::Processing)?;

        let config = self.config_engine.current();
        let semaphore = Arc::new(Semaphore::new(request.options.max_concurrency));
        let total_batches = worklist.chunks(request.options.batch_size.max(1)).count();
        let mut results = Vec::with_capacity(worklist.len());

        'batches: for (batch_idx, batch) in worklist.chunks(request.options.batch_size.max(1)).enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            self.progress
                .set_batch_progress(&request.request_id, batch_idx + 1, total_batches)?;

            let mut handles = Vec::with_capacity(batch.len());
            for file_path in batch {
                if self.progress.has_exceeded_error_limit(&request.request_id)? {
                    cancelled.store(true, Ordering::SeqCst);
                    break;
                }
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }

                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let file_path = file_path.clone();
                let engine = Arc::clone(&self.engine);
                let extractor = Arc::clone(&self.extractor);
                let renamer = Arc::clone(&self.renamer);
                let config = config.clone();
                let options = request.options.clone();
                let file_cancelled = Arc::clone(&cancelled);

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    process_one_file(file_path, engine, extractor, renamer, config, options, file_cancelled).await
                }));
            }

            for handle in handles {
                let result = match handle.await {
                    Ok(r) => r,
                    Err(join_err) => {
                        warn!(error = %join_err, "file-processing task panicked");
                        continue;
                    }
                };
                self.progress.report_file_result(&request.request_id, &result)?;
                results.push(result);
            }

            if cancelled.load(Ordering::SeqCst) {
                break 'batches;
            }

            // Memory-pressure escalation per §5: every 10th batch in a run
            // exceeding 20 batches, or whenever `forceGc` was requested.
            if request.options.force_gc || (total_batches > 20 && (batch_idx + 1) % 10 == 0) {
                debug_request_gc(&request.request_id);
            }
        }

        let final_phase = derive_final_phase(&results, cancelled.load(Ordering::SeqCst));
        self.progress.mark_completed(&request.request_id, final_phase)?;
        Ok(self
            .finish(&request.request_id, final_phase, worklist.len(), results)
            .await)
    }

    async fn finish(
        &self,
        request_id: &str,
        phase: BulkPhase,
        total_files: usize,
        file_results: Vec<FileProcessingResult>,
    ) -> BulkRunOutcome {
        let progress = self.progress.progress(request_id).unwrap_or_else(|| Progress::new(total_files));
        self.cancellations.lock().await.remove(request_id);
        self.progress.forget(request_id);
        BulkRunOutcome {
            request_id: request_id.to_string(),
            phase,
            total_files,
            file_results,
            progress,
        }
    }
}

/// Escalating GC requests are a JVM/CLR-runtime concept; on this collaborator
/// boundary there is nothing to request, so this is a log-only placeholder
/// kept distinct from the no-op rest of the loop for clarity at call sites.
fn debug_request_gc(request_id: &str) {
    tracing::debug!(request_id, "memory pressure checkpoint reached");
}

/// §4.2 step 8: derive the terminal phase purely from whether any file
/// succeeded and whether any file failed — `(succeeded, failed)` → `{both →
/// CompletedWithWarnings, only succeeded → Completed, only failed or none →
/// Failed}`. `continue_on_error` plays no part here; it only governs
/// whether a missing-path validation error is forgiven in `validate`.
fn derive_final_phase(results: &[FileProcessingResult], was_cancelled: bool) -> BulkPhase {
    if was_cancelled {
        return BulkPhase::Cancelled;
    }
    let succeeded = results.iter().any(|r| r.status == FileStatus::Success);
    let failed = results.iter().any(|r| r.status == FileStatus::Failed);
    match (succeeded, failed) {
        (true, true) => BulkPhase::CompletedWithWarnings,
        (true, false) => BulkPhase::Completed,
        (false, _) => BulkPhase::Failed,
    }
}

async fn process_one_file(
    file_path: PathBuf,
    engine: Arc<IdentificationEngine>,
    extractor: Arc<dyn SubtitleExtractor>,
    renamer: Arc<dyn RenameActor>,
    config: Option<crate::types::Configuration>,
    options: BulkOptions,
    cancelled: Arc<AtomicBool>,
) -> FileProcessingResult {
    let mut result = FileProcessingResult::started(file_path.clone());

    if !file_path.exists() {
        result.status = FileStatus::Failed;
        result.error = Some(Error::FileNotFound(file_path.display().to_string()).to_string());
        result.end = Some(Utc::now());
        return result;
    }

    let mut attempt: u32 = 0;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            result.status = FileStatus::Cancelled;
            result.end = Some(Utc::now());
            return result;
        }

        let attempt_fut = run_attempt(&file_path, &engine, &extractor, &renamer, config.as_ref());
        let outcome = match tokio::time::timeout(options.file_timeout, attempt_fut).await {
            Ok(outcome) => outcome,
            Err(_) if cancelled.load(Ordering::SeqCst) => {
                AttemptOutcome::Fatal(BulkErrorKind::OperationCancelled, "cancelled during processing".to_string())
            }
            Err(_) => AttemptOutcome::Fatal(BulkErrorKind::ProcessingTimeout, "processing timed out".to_string()),
        };

        match outcome {
            AttemptOutcome::Success(mut success) => {
                success.retry_count = attempt;
                success.file_path = file_path;
                return success;
            }
            AttemptOutcome::Fatal(kind, message) => {
                if kind.is_retryable() && attempt < MAX_RETRIES {
                    let backoff = Duration::from_millis(RETRY_BACKOFFS_MS[attempt as usize]);
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = wait_for_cancellation(&cancelled) => {
                            result.status = FileStatus::Cancelled;
                            result.end = Some(Utc::now());
                            return result;
                        }
                    }
                    attempt += 1;
                    continue;
                }
                result.retry_count = attempt;
                result.status = if kind == BulkErrorKind::OperationCancelled {
                    FileStatus::Cancelled
                } else {
                    FileStatus::Failed
                };
                result.error = Some(message);
                result.end = Some(Utc::now());
                return result;
            }
        }
    }
}

async fn wait_for_cancellation(cancelled: &Arc<AtomicBool>) {
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn run_attempt(
    file_path: &PathBuf,
    engine: &Arc<IdentificationEngine>,
    extractor: &Arc<dyn SubtitleExtractor>,
    renamer: &Arc<dyn RenameActor>,
    config: Option<&crate::types::Configuration>,
) -> AttemptOutcome {
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !crate::is_supported_video_extension(&ext) {
        let mut result = FileProcessingResult::started(file_path.clone());
        result.status = FileStatus::Success;
        result.identification = Some(crate::types::IdentificationResult::error("UNSUPPORTED_FILE_TYPE"));
        result.end = Some(Utc::now());
        return AttemptOutcome::Success(result);
    }

    let extracted = match extractor.extract(file_path, None, None).await {
        Ok(Some(extracted)) => extracted,
        Ok(None) => {
            let mut result = FileProcessingResult::started(file_path.clone());
            result.status = FileStatus::Success;
            result.identification = Some(crate::types::IdentificationResult::error("NO_SUBTITLES_FOUND"));
            result.end = Some(Utc::now());
            return AttemptOutcome::Success(result);
        }
        Err(err) => return AttemptOutcome::Fatal(BulkErrorKind::from(&err), err.to_string()),
    };

    let query = QuerySubtitle {
        clean_text: clean_text(&extracted.raw_text),
        raw_text: extracted.raw_text,
        source_format: extracted.source_format,
    };

    let identification = engine.identify(&query, config, None, None, None).await;

    let mut result = FileProcessingResult::started(file_path.clone());
    result.status = FileStatus::Success;

    if let (Some(matched), Some(config)) = (&identification.matched, config) {
        let thresholds = config.thresholds_for(query.source_format);
        if identification.match_confidence >= thresholds.rename_confidence {
            if let Some(suggested) =
                filename::suggest_filename(matched, &config.filename_patterns, &ext)
            {
                match renamer.rename(file_path, &suggested).await {
                    RenameOutcome::Success { new_path } => {
                        result.suggested_filename = Some(
                            new_path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or(suggested),
                        );
                        result.renamed = true;
                    }
                    RenameOutcome::Failure { message, .. } => {
                        result.suggested_filename = Some(suggested);
                        result.renamed = false;
                        result.error = Some(message);
                    }
                }
            }
        }
    }

    result.identification = Some(identification);
    result.end = Some(Utc::now());
    AttemptOutcome::Success(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::collaborators::test_support::{NoopRenameActor, StaticSubtitleExtractor};
    use crate::embeddings::provider::test_support::{deterministic_embedding, DeterministicProvider};
    use crate::index::test_support::InMemoryIndexStore;
    use crate::types::{IndexEntry, SubtitleSourceFormat};
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};
    use uuid::Uuid;

    fn write_config_file(config_json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(config_json.as_bytes()).unwrap();
        file
    }

    fn make_orchestrator(
        extractor: Arc<dyn SubtitleExtractor>,
        config_json: &str,
    ) -> (BulkOrchestrator, NamedTempFile) {
        let store = Arc::new(InMemoryIndexStore::seeded(vec![IndexEntry {
            id: Uuid::new_v4(),
            series: "Spacefall".to_string(),
            season: 1,
            episode: 1,
            episode_name: None,
            clean_text: "a very specific transcript about space pirates".to_string(),
            source_format: SubtitleSourceFormat::Text,
            ctph_hash: crate::hash::CtphFingerprint::compute("a very specific transcript about space pirates")
                .as_str()
                .to_string(),
            embedding: Some(deterministic_embedding("a very specific transcript about space pirates")),
        }]));
        let provider = Arc::new(DeterministicProvider::default());
        let engine = Arc::new(IdentificationEngine::new(store, provider));
        let renamer = Arc::new(NoopRenameActor);
        let file = write_config_file(config_json);
        let config_engine = Arc::new(ConfigurationEngine::new(file.path()));
        config_engine.load().unwrap();
        let progress = Arc::new(ProgressTracker::new());
        (
            BulkOrchestrator::new(engine, extractor, renamer, config_engine, progress),
            file,
        )
    }

    const LOW_THRESHOLD_CONFIG: &str = r#"{
        "version": "1.0",
        "matchingStrategy": "embedding",
        "matchingThresholds": {
            "Text": {"matchConfidence": 0.10, "renameConfidence": 0.10, "embedSimilarity": 0.10, "fuzzyHashSimilarity": 10.0}
        },
        "maxConcurrency": 4,
        "filenamePatterns": {"primaryPattern": "{series} S{season:02}E{episode:02}", "fallbackPatterns": []}
    }"#;

    #[tokio::test]
    async fn scenario_missing_file_with_continue_on_error_yields_failed_run() {
        let extractor = Arc::new(StaticSubtitleExtractor::new());
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);
        let mut options = BulkOptions::default();
        options.continue_on_error = true;
        let request = BulkRequest {
            request_id: "req-missing".to_string(),
            paths: vec![PathBuf::from("/nope.mkv")],
            options,
        };

        let outcome = orchestrator.process(request).await.unwrap();
        assert_eq!(outcome.phase, BulkPhase::Failed);
        assert_eq!(outcome.total_files, 1);
        assert_eq!(outcome.file_results.len(), 1);
        assert_eq!(outcome.file_results[0].status, FileStatus::Failed);
        assert!(outcome.file_results[0].error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn scenario_duplicate_paths_are_rejected_before_processing() {
        let extractor = Arc::new(StaticSubtitleExtractor::new());
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);
        let dup = PathBuf::from("/videos/a.mkv");
        let request = BulkRequest {
            request_id: "req-dup".to_string(),
            paths: vec![dup.clone(), dup],
            options: BulkOptions::default(),
        };

        let err = orchestrator.process(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.starts_with("Duplicate path specified:")));
    }

    #[tokio::test]
    async fn scenario_zero_concurrency_is_rejected() {
        let extractor = Arc::new(StaticSubtitleExtractor::new());
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);
        let mut options = BulkOptions::default();
        options.max_concurrency = 0;
        let request = BulkRequest {
            request_id: "req-zero".to_string(),
            paths: vec![PathBuf::from("/a.mkv")],
            options,
        };

        let err = orchestrator.process(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m == "Max concurrency must be greater than zero"));
    }

    #[tokio::test]
    async fn scenario_too_short_progress_interval_is_rejected() {
        let extractor = Arc::new(StaticSubtitleExtractor::new());
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);
        let mut options = BulkOptions::default();
        options.progress_interval_ms = 50;
        let request = BulkRequest {
            request_id: "req-interval".to_string(),
            paths: vec![PathBuf::from("/a.mkv")],
            options,
        };

        let err = orchestrator.process(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.ends_with("at least 100ms")));
    }

    #[tokio::test]
    async fn successful_identification_renames_file() {
        let dir = tempdir().unwrap();
        let video_path = dir.path().join("unknown.mkv");
        std::fs::write(&video_path, b"").unwrap();

        let extractor = Arc::new(
            StaticSubtitleExtractor::new()
                .with_text(&video_path, "a very specific transcript about space pirates"),
        );
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);

        let request = BulkRequest {
            request_id: "req-rename".to_string(),
            paths: vec![video_path],
            options: BulkOptions::default(),
        };

        let outcome = orchestrator.process(request).await.unwrap();
        assert_eq!(outcome.phase, BulkPhase::Completed);
        let file_result = &outcome.file_results[0];
        assert_eq!(file_result.status, FileStatus::Success);
        assert!(file_result.renamed);
        assert_eq!(file_result.suggested_filename.as_deref(), Some("Spacefall S01E01.mkv"));
    }

    #[tokio::test]
    async fn no_subtitle_track_counts_as_processed_not_failed() {
        let dir = tempdir().unwrap();
        let video_path = dir.path().join("blank.mkv");
        std::fs::write(&video_path, b"").unwrap();

        let extractor = Arc::new(StaticSubtitleExtractor::new());
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);

        let request = BulkRequest {
            request_id: "req-nosubs".to_string(),
            paths: vec![video_path],
            options: BulkOptions::default(),
        };

        let outcome = orchestrator.process(request).await.unwrap();
        assert_eq!(outcome.phase, BulkPhase::Completed);
        assert_eq!(outcome.file_results[0].status, FileStatus::Success);
        assert_eq!(
            outcome.file_results[0].identification.as_ref().unwrap().error.as_deref(),
            Some("NO_SUBTITLES_FOUND")
        );
    }

    #[tokio::test]
    async fn cancellation_stops_further_processing() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let p = dir.path().join(format!("f{i}.mkv"));
            std::fs::write(&p, b"").unwrap();
            paths.push(p);
        }
        let extractor = Arc::new(StaticSubtitleExtractor::new().with_delay(Duration::from_millis(50)));
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);
        let orchestrator = Arc::new(orchestrator);

        let mut options = BulkOptions::default();
        options.max_concurrency = 1;
        options.batch_size = 1;
        let request = BulkRequest {
            request_id: "req-cancel".to_string(),
            paths,
            options,
        };

        let runner = Arc::clone(&orchestrator);
        let handle = tokio::spawn(async move { runner.process(request).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.cancel("req-cancel").await;
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.phase, BulkPhase::Cancelled);
    }

    #[test]
    fn estimate_counts_discovered_and_literal_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("b.mkv"), b"").unwrap();

        let extractor = Arc::new(StaticSubtitleExtractor::new());
        let (orchestrator, _file) = make_orchestrator(extractor, LOW_THRESHOLD_CONFIG);
        let request = BulkRequest {
            request_id: "req-estimate".to_string(),
            paths: vec![dir.path().to_path_buf()],
            options: BulkOptions::default(),
        };
        assert_eq!(orchestrator.estimate(&request).unwrap(), 2);
    }
}
