//! Scenario 5: hybrid-strategy near-tie disambiguation. Two candidates'
//! embedding similarities (0.92 and 0.915) fall within the near-tie
//! window, and the summary-embedding re-rank swaps their order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use epimatch_core::embeddings::EmbeddingProvider;
use epimatch_core::error::Result;
use epimatch_core::index::test_support::InMemoryIndexStore;
use epimatch_core::index::IndexStore;
use epimatch_core::types::{
    Configuration, Embedding, FilenamePatterns, IndexEntry, MatchingStrategy, QuerySubtitle, SubtitleSourceFormat,
    Thresholds, EMBEDDING_DIM,
};
use epimatch_core::IdentificationEngine;

/// An embedding provider keyed by exact input text, so a test can pin down
/// precisely what vector each quartile chunk or full-text query resolves
/// to instead of relying on a hash.
struct ControlledProvider {
    by_text: HashMap<String, Embedding>,
}

#[async_trait]
impl EmbeddingProvider for ControlledProvider {
    async fn generate(&self, text: &str) -> Result<Embedding> {
        Ok(self
            .by_text
            .get(text)
            .unwrap_or_else(|| panic!("no controlled embedding registered for {text:?}"))
            .clone())
    }
}

fn basis(dim_a: usize, value_a: f32, dim_b: usize, value_b: f32) -> Embedding {
    let mut values = vec![0.0f32; EMBEDDING_DIM];
    values[dim_a] = value_a;
    values[dim_b] = value_b;
    Embedding::new(values).expect("384-dim vector")
}

fn unit(dim: usize) -> Embedding {
    basis(dim, 1.0, dim, 1.0)
}

fn fixture_config() -> Configuration {
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

#[tokio::test]
async fn near_tie_cluster_reorders_by_summary_embedding() {
    // q_full: basis vector on dim 0, used as the initial query embedding.
    let q_full = unit(0);
    // e1: the query's and candidate B's quartile-chunk summary embedding.
    let e1 = unit(1);
    // e2: candidate A's quartile-chunk summary embedding, orthogonal to e1.
    let e2 = unit(2);

    // embA: cos(q_full, embA) = 0.92 exactly.
    let emb_a = basis(0, 0.92, 1, (1.0 - 0.92_f32.powi(2)).sqrt());
    // embB: cos(q_full, embB) = 0.915 exactly, within the 0.02 near-tie window of A.
    let emb_b = basis(0, 0.915, 1, (1.0 - 0.915_f32.powi(2)).sqrt());

    let store = Arc::new(InMemoryIndexStore::new());
    let entry_a = IndexEntry {
        id: uuid::Uuid::new_v4(),
        series: "Candidate Show".to_string(),
        season: 1,
        episode: 1,
        episode_name: None,
        clean_text: "AAAA".to_string(),
        source_format: SubtitleSourceFormat::Text,
        ctph_hash: epimatch_core::hash::CtphFingerprint::compute("AAAA").to_string(),
        embedding: Some(emb_a),
    };
    let entry_b = IndexEntry {
        id: uuid::Uuid::new_v4(),
        series: "Candidate Show".to_string(),
        season: 1,
        episode: 2,
        episode_name: None,
        clean_text: "BBBB".to_string(),
        source_format: SubtitleSourceFormat::Text,
        ctph_hash: epimatch_core::hash::CtphFingerprint::compute("BBBB").to_string(),
        embedding: Some(emb_b),
    };
    store.insert(entry_a).await.expect("insert A");
    store.insert(entry_b.clone()).await.expect("insert B");

    let mut by_text = HashMap::new();
    by_text.insert("QQQQ".to_string(), q_full);
    by_text.insert("Q".to_string(), e1.clone());
    by_text.insert("B".to_string(), e1);
    by_text.insert("A".to_string(), e2);
    let provider = Arc::new(ControlledProvider { by_text });

    let engine = IdentificationEngine::new(store, provider);
    let query = QuerySubtitle {
        raw_text: "QQQQ".to_string(),
        clean_text: "QQQQ".to_string(),
        source_format: SubtitleSourceFormat::Text,
    };
    let config = fixture_config();

    let result = engine.identify(&query, Some(&config), None, None, None).await;

    // Before rerank, A (0.92) ranked first; the summary-embedding pass
    // pulls B (whose summary matches the query's exactly) to the top.
    let matched = result.matched.expect("near-tie cluster must still produce a match");
    assert_eq!(matched.episode, entry_b.episode);
    assert!((result.match_confidence - 0.915).abs() < 1e-6);
    assert!(result.ambiguity_notes.is_some());
}
