//! Seeds a temporary index with a handful of episodes and runs one
//! identification against it, printing the engine's full decision trail.
//! Useful for sanity-checking a matching strategy change without wiring up
//! a real embedding/subtitle helper.

use std::sync::Arc;

use anyhow::Result;
use epimatch_core::embeddings::provider::test_support::{deterministic_embedding, DeterministicProvider};
use epimatch_core::index::IndexStore;
use epimatch_core::types::{IndexEntry, QuerySubtitle, SubtitleSourceFormat};
use epimatch_core::IdentificationEngine;
use epimatch_storage_turso::TursoStorage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("inspect.db");
    let storage = Arc::new(TursoStorage::connect(&format!("file:{}", db_path.display()), "").await?);

    for episode in 1..=5u32 {
        let clean_text = format!("Demo Show season 1 episode {episode} transcript about the crew's mission");
        let entry = IndexEntry {
            id: uuid::Uuid::new_v4(),
            series: "Demo Show".to_string(),
            season: 1,
            episode,
            episode_name: None,
            clean_text: clean_text.clone(),
            source_format: SubtitleSourceFormat::Text,
            ctph_hash: epimatch_core::hash::CtphFingerprint::compute(&clean_text).to_string(),
            embedding: Some(deterministic_embedding(&clean_text)),
        };
        storage.insert(entry).await?;
    }
    println!("seeded {} rows", storage.count().await?);

    let provider = Arc::new(DeterministicProvider::default());
    let engine = IdentificationEngine::new(storage, provider);

    let query = QuerySubtitle {
        raw_text: "Demo Show season 1 episode 3 transcript about the crew's mission".to_string(),
        clean_text: "Demo Show season 1 episode 3 transcript about the crew's mission".to_string(),
        source_format: SubtitleSourceFormat::Text,
    };
    let config = fixture_config();
    let result = engine.identify(&query, Some(&config), None, None, None).await;

    println!("identification result: {result:#?}");
    Ok(())
}

fn fixture_config() -> epimatch_core::types::Configuration {
    use std::collections::HashMap;
    use epimatch_core::types::{Configuration, FilenamePatterns, MatchingStrategy, Thresholds};

    let mut thresholds = HashMap::new();
    thresholds.insert(
        SubtitleSourceFormat::Text,
        Thresholds { match_confidence: 0.75, rename_confidence: 0.85, fuzzy_hash_similarity: 70.0, embed_similarity: 0.5 },
    );
    Configuration {
        version: "1.0".to_string(),
        matching_strategy: MatchingStrategy::Hybrid,
        thresholds,
        text_rank_filtering: None,
        max_concurrency: 4,
        filename_patterns: FilenamePatterns {
            primary_pattern: "{series} S{season:02}E{episode:02}".to_string(),
            fallback_patterns: Vec::new(),
        },
    }
}
