//! Core data model shared by the identification engine, the bulk
//! orchestrator, and the storage backends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimensionality every stored and query embedding must have.
pub const EMBEDDING_DIM: usize = 384;

/// Origin category of subtitle text, used to select per-format thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SubtitleSourceFormat {
    Text,
    Pgs,
    VobSub,
}

impl std::fmt::Display for SubtitleSourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleSourceFormat::Text => write!(f, "Text"),
            SubtitleSourceFormat::Pgs => write!(f, "PGS"),
            SubtitleSourceFormat::VobSub => write!(f, "VobSub"),
        }
    }
}

/// A fixed-dimension, L2-normalized semantic embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap a raw vector, validating its dimensionality.
    ///
    /// Does not re-normalize: callers (the embedding collaborator) are
    /// contractually required to hand back L2-normalized vectors.
    pub fn new(values: Vec<f32>) -> crate::error::Result<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(crate::error::Error::InvalidInput(format!(
                "embedding must have {EMBEDDING_DIM} dimensions, got {}",
                values.len()
            )));
        }
        Ok(Self(values))
    }

    /// Raw component slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Current L2 norm; should be `1 ± 1e-4` for any value produced by the
    /// embedding collaborator.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Encode as little-endian IEEE-754 float32 bytes (`4 × 384`), the wire
    /// format used by the persistent index's `Embedding` column.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(EMBEDDING_DIM * 4);
        for v in &self.0 {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Decode from the little-endian float32 blob format.
    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        if bytes.len() != EMBEDDING_DIM * 4 {
            return Err(crate::error::Error::InvalidFileFormat(format!(
                "embedding blob must be {} bytes, got {}",
                EMBEDDING_DIM * 4,
                bytes.len()
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(values)
    }
}

/// A single previously-indexed episode's subtitle fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub series: String,
    pub season: u32,
    pub episode: u32,
    pub episode_name: Option<String>,
    pub clean_text: String,
    pub source_format: SubtitleSourceFormat,
    pub ctph_hash: String,
    pub embedding: Option<Embedding>,
}

impl IndexEntry {
    /// `true` when this row still needs a migration backfill: no embedding
    /// yet, but text to generate one from.
    #[must_use]
    pub fn needs_embedding_backfill(&self) -> bool {
        self.embedding.is_none() && !self.clean_text.is_empty()
    }
}

/// Subtitle text carried through one identification request.
#[derive(Debug, Clone)]
pub struct QuerySubtitle {
    pub raw_text: String,
    pub clean_text: String,
    pub source_format: SubtitleSourceFormat,
}

/// How an [`IdentificationResult`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    Embedding,
    Ctph,
    CtphTextFallback,
    None,
}

/// The episode an identification matched against, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEpisode {
    pub series: String,
    pub season: u32,
    pub episode: u32,
    pub episode_name: Option<String>,
}

/// Outcome of identifying a single subtitle against the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationResult {
    pub matched: Option<MatchedEpisode>,
    pub match_confidence: f64,
    pub method: MatchMethod,
    pub used_text_fallback: bool,
    pub hash_score: f64,
    pub text_score: f64,
    pub ambiguity_notes: Option<String>,
    pub error: Option<String>,
}

impl IdentificationResult {
    /// The canonical "no match" result: `method = None`, confidence zero.
    #[must_use]
    pub fn none() -> Self {
        Self {
            matched: None,
            match_confidence: 0.0,
            method: MatchMethod::None,
            used_text_fallback: false,
            hash_score: 0.0,
            text_score: 0.0,
            ambiguity_notes: None,
            error: None,
        }
    }

    /// An error result carrying a stable code, still `method = None`.
    #[must_use]
    pub fn error(code: impl Into<String>) -> Self {
        Self {
            error: Some(code.into()),
            ..Self::none()
        }
    }

    /// Invariant check used by tests and callers: `method = None ⇔
    /// matchConfidence = 0`.
    #[must_use]
    pub fn upholds_method_confidence_invariant(&self) -> bool {
        (self.method == MatchMethod::None) == (self.match_confidence == 0.0)
    }
}

/// Bounded knobs for one bulk run. See §3 for the bound on each field;
/// violating any of them is an `InvalidInput` validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub progress_interval_ms: u64,
    pub max_errors_before_abort: Option<usize>,
    pub file_timeout: Duration,
    pub recursive: bool,
    pub max_depth: Option<usize>,
    pub include_exts: Vec<String>,
    pub exclude_exts: Vec<String>,
    pub continue_on_error: bool,
    pub create_backups: bool,
    pub force_gc: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrency: 4,
            progress_interval_ms: 500,
            max_errors_before_abort: None,
            file_timeout: Duration::from_secs(300),
            recursive: true,
            max_depth: None,
            include_exts: Vec::new(),
            exclude_exts: Vec::new(),
            continue_on_error: false,
            create_backups: false,
            force_gc: false,
        }
    }
}

/// One bulk identification/rename request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub request_id: String,
    pub paths: Vec<PathBuf>,
    pub options: BulkOptions,
}

/// Lifecycle status of a single file within a bulk run. Transitions only
/// forward: `Processing → {Success, Failed, Cancelled, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Processing,
    Success,
    Failed,
    Cancelled,
    Skipped,
}

impl FileStatus {
    /// Whether this is a terminal state (no further transitions expected).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, FileStatus::Processing)
    }
}

/// Outcome of processing a single file within a bulk run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProcessingResult {
    pub file_path: PathBuf,
    pub status: FileStatus,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub identification: Option<IdentificationResult>,
    pub error: Option<String>,
    pub suggested_filename: Option<String>,
    pub renamed: bool,
}

impl FileProcessingResult {
    #[must_use]
    pub fn started(file_path: PathBuf) -> Self {
        Self {
            file_path,
            status: FileStatus::Processing,
            start: Utc::now(),
            end: None,
            retry_count: 0,
            identification: None,
            error: None,
            suggested_filename: None,
            renamed: false,
        }
    }
}

/// Forward-only phase of a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BulkPhase {
    Initializing,
    Validating,
    Discovery,
    Processing,
    Completed,
    CompletedWithWarnings,
    Failed,
    Cancelled,
}

impl BulkPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BulkPhase::Completed
                | BulkPhase::CompletedWithWarnings
                | BulkPhase::Failed
                | BulkPhase::Cancelled
        )
    }
}

/// Rolling metrics tracked across a bulk run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub avg_processing_time_ms: f64,
    pub min_processing_time_ms: Option<f64>,
    pub max_processing_time_ms: Option<f64>,
    pub skip_reasons: HashMap<String, u64>,
    pub current_batch: usize,
    pub total_batches: usize,
}

impl Metrics {
    /// Fold in one more file's processing time (milliseconds).
    pub fn record_duration(&mut self, duration_ms: f64, sample_count: u64) {
        self.min_processing_time_ms = Some(
            self.min_processing_time_ms
                .map_or(duration_ms, |m| m.min(duration_ms)),
        );
        self.max_processing_time_ms = Some(
            self.max_processing_time_ms
                .map_or(duration_ms, |m| m.max(duration_ms)),
        );
        if sample_count == 0 {
            self.avg_processing_time_ms = duration_ms;
        } else {
            let n = sample_count as f64;
            self.avg_processing_time_ms =
                (self.avg_processing_time_ms * n + duration_ms) / (n + 1.0);
        }
    }

    pub fn record_skip(&mut self, reason: impl Into<String>) {
        *self.skip_reasons.entry(reason.into()).or_insert(0) += 1;
    }
}

/// Live state of one bulk run, owned by the progress tracker under a
/// per-request lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub phase: BulkPhase,
    pub current_file: Option<PathBuf>,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub errors: Vec<String>,
    pub metrics: Metrics,
}

impl Progress {
    #[must_use]
    pub fn new(total_files: usize) -> Self {
        let now = Utc::now();
        Self {
            total_files,
            processed_files: 0,
            failed_files: 0,
            skipped_files: 0,
            phase: BulkPhase::Initializing,
            current_file: None,
            start_time: now,
            last_update: now,
            errors: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    /// `processed + failed + skipped ≤ total`.
    #[must_use]
    pub fn upholds_total_invariant(&self) -> bool {
        self.processed_files + self.failed_files + self.skipped_files <= self.total_files
    }
}

/// Matching strategy selection. An unrecognized value defaults to
/// `Embedding` with a warning at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    Embedding,
    Fuzzy,
    Hybrid,
}

/// Per-source-format confidence thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub match_confidence: f64,
    pub rename_confidence: f64,
    pub fuzzy_hash_similarity: f64,
    pub embed_similarity: f64,
}

/// TextRank pre-embedding reduction settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TextRankFiltering {
    pub enabled: bool,
    pub percentage: f64,
    pub min_sentences: usize,
    pub min_percentage: f64,
}

impl Default for TextRankFiltering {
    fn default() -> Self {
        Self {
            enabled: false,
            percentage: 30.0,
            min_sentences: 5,
            min_percentage: 10.0,
        }
    }
}

/// Primary + fallback filename rename templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenamePatterns {
    pub primary_pattern: String,
    pub fallback_patterns: Vec<String>,
}

/// A fully validated, immutable configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub version: String,
    pub matching_strategy: MatchingStrategy,
    pub thresholds: HashMap<SubtitleSourceFormat, Thresholds>,
    pub text_rank_filtering: Option<TextRankFiltering>,
    pub max_concurrency: usize,
    pub filename_patterns: FilenamePatterns,
}

impl Configuration {
    /// Threshold set for a format, falling back to `Text`'s thresholds if
    /// the format has no explicit entry.
    #[must_use]
    pub fn thresholds_for(&self, format: SubtitleSourceFormat) -> Thresholds {
        self.thresholds
            .get(&format)
            .copied()
            .or_else(|| self.thresholds.get(&SubtitleSourceFormat::Text).copied())
            .unwrap_or(Thresholds {
                match_confidence: 0.75,
                rename_confidence: 0.85,
                fuzzy_hash_similarity: 70.0,
                embed_similarity: 0.75,
            })
    }
}
