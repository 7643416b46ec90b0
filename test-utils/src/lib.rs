//! # Test Utilities
//!
//! Shared fixture builders for `epimatch-core` and its storage backends:
//! sample [`IndexEntry`] rows, a minimal valid [`Configuration`], and
//! [`BulkRequest`]/[`BulkOptions`] builders. Behind the `turso` feature, a
//! [`TursoTestHarness`] spins up a temp-file-backed durable index for
//! integration tests that need a real store rather than
//! `InMemoryIndexStore`.

use std::collections::HashMap;
use std::path::PathBuf;

use epimatch_core::types::{
    BulkOptions, BulkRequest, Configuration, FilenamePatterns, IndexEntry, MatchingStrategy, SubtitleSourceFormat,
    Thresholds,
};
pub use epimatch_core::embeddings::provider::test_support::{deterministic_embedding, DeterministicProvider};
pub use epimatch_core::index::test_support::InMemoryIndexStore;
pub use epimatch_core::bulk::collaborators::test_support::{NoopRenameActor, StaticSubtitleExtractor};

/// One sample index row for `series`/`season`/`episode`, with a
/// deterministic embedding derived from its clean text so cosine search
/// tests get realistic-looking (if meaningless) similarity scores.
#[must_use]
pub fn sample_entry(series: &str, season: u32, episode: u32) -> IndexEntry {
    let clean_text = format!("{series} season {season} episode {episode} transcript");
    IndexEntry {
        id: uuid::Uuid::new_v4(),
        series: series.to_string(),
        season,
        episode,
        episode_name: None,
        clean_text: clean_text.clone(),
        source_format: SubtitleSourceFormat::Text,
        ctph_hash: epimatch_core::hash::CtphFingerprint::compute(&clean_text).to_string(),
        embedding: Some(deterministic_embedding(&clean_text)),
    }
}

/// As [`sample_entry`], but with `embedding` left unset (not yet migrated).
#[must_use]
pub fn sample_entry_without_embedding(series: &str, season: u32, episode: u32) -> IndexEntry {
    let mut entry = sample_entry(series, season, episode);
    entry.embedding = None;
    entry
}

/// A minimal, already-valid [`Configuration`] for a single source format,
/// suitable as a starting point for tests that tweak one field.
#[must_use]
pub fn sample_configuration() -> Configuration {
    let mut thresholds = HashMap::new();
    thresholds.insert(
        SubtitleSourceFormat::Text,
        Thresholds {
            match_confidence: 0.75,
            rename_confidence: 0.85,
            fuzzy_hash_similarity: 70.0,
            embed_similarity: 0.60,
        },
    );
    Configuration {
        version: "1.0".to_string(),
        matching_strategy: MatchingStrategy::Hybrid,
        thresholds,
        text_rank_filtering: None,
        max_concurrency: 4,
        filename_patterns: FilenamePatterns {
            primary_pattern: "{series} S{season:02}E{episode:02}".to_string(),
            fallback_patterns: vec!["{series} {season}x{episode}".to_string()],
        },
    }
}

/// A [`BulkRequest`] over `paths` with otherwise-default options.
#[must_use]
pub fn sample_bulk_request(paths: Vec<PathBuf>) -> BulkRequest {
    BulkRequest { request_id: uuid::Uuid::new_v4().to_string(), paths, options: BulkOptions::default() }
}

/// `count` fixture entries for the same series, spanning season 1,
/// episodes `1..=count`.
#[must_use]
pub fn sample_entries(series: &str, count: u32) -> Vec<IndexEntry> {
    (1..=count).map(|episode| sample_entry(series, 1, episode)).collect()
}

#[cfg(feature = "turso")]
pub use turso_harness::TursoTestHarness;

#[cfg(feature = "turso")]
mod turso_harness {
    use std::sync::Arc;

    use epimatch_storage_turso::TursoStorage;
    use rand::Rng;
    use tempfile::TempDir;

    use super::sample_entry;
    use epimatch_core::index::IndexStore;
    use epimatch_core::types::IndexEntry;

    /// A temp-file-backed [`TursoStorage`] for integration tests that need
    /// real persistence semantics (WAL durability, actual SQL scans)
    /// instead of [`super::InMemoryIndexStore`].
    pub struct TursoTestHarness {
        pub storage: Arc<TursoStorage>,
        _temp_dir: TempDir,
    }

    impl TursoTestHarness {
        /// Open a fresh database file under a new temp directory and run
        /// its schema.
        ///
        /// # Errors
        ///
        /// Returns `Err` if the database cannot be created.
        pub async fn new() -> anyhow::Result<Self> {
            let temp_dir = TempDir::new()?;
            let db_path = temp_dir.path().join("test.db");
            let storage = TursoStorage::connect(&format!("file:{}", db_path.display()), "").await?;
            Ok(Self { storage: Arc::new(storage), _temp_dir: temp_dir })
        }

        /// Insert `count` randomly-seeded fixture rows for `series` and
        /// return them.
        ///
        /// # Errors
        ///
        /// Returns `Err` if any insert fails.
        pub async fn seed(&self, series: &str, count: u32) -> anyhow::Result<Vec<IndexEntry>> {
            let mut rng = rand::rng();
            let mut entries = Vec::with_capacity(count as usize);
            for episode in 1..=count {
                let season = rng.random_range(1..=3);
                let entry = sample_entry(series, season, episode);
                self.storage.insert(entry.clone()).await?;
                entries.push(entry);
            }
            Ok(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_entry_has_normalized_embedding() {
        let entry = sample_entry("Show A", 1, 2);
        let embedding = entry.embedding.expect("sample_entry always sets an embedding");
        assert!((embedding.norm() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sample_configuration_passes_validation() {
        let config = sample_configuration();
        epimatch_core::config::validate(&config).expect("sample_configuration must be valid");
    }

    #[test]
    fn sample_entries_span_requested_episode_range() {
        let entries = sample_entries("Show B", 5);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].episode, 1);
        assert_eq!(entries[4].episode, 5);
    }
}
