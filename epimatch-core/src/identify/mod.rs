//! Matching strategy dispatch: embedding search, CTPH fingerprint
//! comparison, and the hybrid combination of the two.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embeddings::{cosine_similarity, summary_embedding, EmbeddingProvider};
use crate::error::Error;
use crate::hash::{self, CtphFingerprint};
use crate::index::{IndexStore, SearchFilter, SearchHit};
use crate::text::textrank::reduce_to_top_sentences;
use crate::types::{Configuration, IdentificationResult, MatchMethod, MatchedEpisode, MatchingStrategy, QuerySubtitle, Thresholds};

/// Near-tie window: candidates within this much of the top similarity form
/// the ambiguous cluster that gets summary-embedding re-ranked.
const NEAR_TIE_WINDOW: f64 = 0.02;
/// Below this confidence, an ambiguous embedding result is not trusted on
/// its own in hybrid mode and CTPH is also consulted.
const HYBRID_FALLBACK_CONFIDENCE: f64 = 0.60;
const EMBEDDING_TOP_K: usize = 10;

/// Dispatches subtitle text to the embedding and/or CTPH matching paths and
/// returns a single best-guess [`IdentificationResult`].
pub struct IdentificationEngine {
    store: Arc<dyn IndexStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl IdentificationEngine {
    #[must_use]
    pub fn new(store: Arc<dyn IndexStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Identify `query` against the index using `config`'s matching
    /// strategy and thresholds.
    ///
    /// Never returns `Err`: every failure mode in §4.1 is represented as an
    /// `IdentificationResult` with `error` set, so callers (in particular
    /// the bulk orchestrator) always have a well-formed per-file outcome to
    /// record.
    pub async fn identify(
        &self,
        query: &QuerySubtitle,
        config: Option<&Configuration>,
        min_confidence: Option<f64>,
        series_filter: Option<&str>,
        season_filter: Option<u32>,
    ) -> IdentificationResult {
        if query.clean_text.trim().is_empty() {
            return IdentificationResult::error(Error::IdentificationFailed("empty clean text".into()).code());
        }
        let Some(config) = config else {
            return IdentificationResult::error(Error::ConfigurationError("no configuration loaded".into()).code());
        };

        let filter = SearchFilter {
            series: series_filter.map(str::to_string),
            season: season_filter,
        };
        let thresholds = config.thresholds_for(query.source_format);

        let result = match config.matching_strategy {
            MatchingStrategy::Embedding => {
                self.embedding_path(query, config, &filter, thresholds, min_confidence).await
            }
            MatchingStrategy::Fuzzy => self.ctph_path(query, &filter, thresholds, min_confidence).await,
            MatchingStrategy::Hybrid => {
                let embedding_result = self
                    .embedding_path(query, config, &filter, thresholds, min_confidence)
                    .await;
                let is_ambiguous_low_confidence = embedding_result.ambiguity_notes.is_some()
                    && embedding_result.match_confidence < HYBRID_FALLBACK_CONFIDENCE;
                if embedding_result.method == MatchMethod::None || is_ambiguous_low_confidence {
                    let ctph_result = self.ctph_path(query, &filter, thresholds, min_confidence).await;
                    if ctph_result.method != MatchMethod::None {
                        ctph_result
                    } else {
                        embedding_result
                    }
                } else {
                    embedding_result
                }
            }
        };

        debug_assert!(result.upholds_method_confidence_invariant());
        result
    }

    async fn embedding_path(
        &self,
        query: &QuerySubtitle,
        config: &Configuration,
        filter: &SearchFilter,
        thresholds: Thresholds,
        min_confidence: Option<f64>,
    ) -> IdentificationResult {
        let embed_text = match &config.text_rank_filtering {
            Some(tr) if tr.enabled => reduce_to_top_sentences(
                &query.clean_text,
                tr.percentage,
                tr.min_sentences,
                tr.min_percentage,
            ),
            _ => query.clean_text.clone(),
        };

        let query_vector = match self.provider.generate(&embed_text).await {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "embedding generation failed, falling back");
                return IdentificationResult::none();
            }
        };

        let hits = match self
            .store
            .search(&query_vector, EMBEDDING_TOP_K, thresholds.embed_similarity, filter)
            .await
        {
            Ok(h) => h,
            Err(err) => return IdentificationResult::error_with_message(err),
        };

        if hits.is_empty() {
            return IdentificationResult::none();
        }

        let reordered = self.rerank_near_tie(&query.clean_text, hits).await;
        let best = &reordered[0];
        let confidence = best.similarity.clamp(0.0, 1.0);

        let effective_threshold = effective_threshold(thresholds.match_confidence, min_confidence);
        if confidence < effective_threshold {
            return IdentificationResult::none();
        }

        let ambiguity_notes = (reordered.len() > 1).then(|| {
            format!(
                "{} candidates within near-tie range; top similarity {:.4}",
                reordered.len(),
                reordered[0].similarity
            )
        });

        IdentificationResult {
            matched: Some(MatchedEpisode {
                series: best.entry.series.clone(),
                season: best.entry.season,
                episode: best.entry.episode,
                episode_name: best.entry.episode_name.clone(),
            }),
            match_confidence: confidence,
            method: MatchMethod::Embedding,
            used_text_fallback: false,
            hash_score: 0.0,
            text_score: 0.0,
            ambiguity_notes,
            error: None,
        }
    }

    /// Partition `hits` into the near-tie cluster (a contiguous prefix,
    /// since `hits` is sorted descending) and re-rank it by the combined
    /// original/summary-embedding score. Non-clustered hits keep their
    /// original relative order after the reranked prefix.
    async fn rerank_near_tie(&self, query_text: &str, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        if hits.len() < 2 {
            return hits;
        }
        let top_similarity = hits[0].similarity;
        let cluster_len = hits
            .iter()
            .take_while(|h| top_similarity - h.similarity <= NEAR_TIE_WINDOW)
            .count();
        if cluster_len < 2 {
            return hits;
        }

        let (cluster, rest) = hits.split_at(cluster_len);
        let cluster = cluster.to_vec();
        let rest = rest.to_vec();

        let provider = Arc::clone(&self.provider);
        let query_summary = match summary_embedding(query_text, |chunk| {
            let provider = Arc::clone(&provider);
            async move { provider.generate(&chunk).await }
        })
        .await
        {
            Ok(s) => s,
            Err(err) => {
                debug!(error = %err, "summary embedding failed for query, skipping near-tie rerank");
                return [cluster, rest].concat();
            }
        };

        // One representative per distinct episode in the cluster.
        let mut seen_episodes: Vec<(String, u32, u32)> = Vec::new();
        let mut combined_scores = vec![0.0_f64; cluster.len()];
        for (idx, hit) in cluster.iter().enumerate() {
            let key = (hit.entry.series.clone(), hit.entry.season, hit.entry.episode);
            if seen_episodes.contains(&key) {
                continue;
            }
            seen_episodes.push(key);

            let provider = Arc::clone(&self.provider);
            let stored_summary = summary_embedding(&hit.entry.clean_text, |chunk| {
                let provider = Arc::clone(&provider);
                async move { provider.generate(&chunk).await }
            })
            .await;

            let combined = match stored_summary {
                Ok(stored_summary) => {
                    0.3 * hit.similarity + 0.7 * cosine_similarity(&query_summary, &stored_summary)
                }
                Err(_) => hit.similarity,
            };
            combined_scores[idx] = combined;
            // Every other cluster hit for the same episode shares this score.
            for (other_idx, other) in cluster.iter().enumerate() {
                if other_idx != idx
                    && other.entry.series == hit.entry.series
                    && other.entry.season == hit.entry.season
                    && other.entry.episode == hit.entry.episode
                {
                    combined_scores[other_idx] = combined;
                }
            }
        }

        let mut indices: Vec<usize> = (0..cluster.len()).collect();
        indices.sort_by(|&a, &b| {
            combined_scores[b]
                .partial_cmp(&combined_scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let reordered_cluster: Vec<SearchHit> = indices.into_iter().map(|i| cluster[i].clone()).collect();

        [reordered_cluster, rest].concat()
    }

    async fn ctph_path(
        &self,
        query: &QuerySubtitle,
        filter: &SearchFilter,
        thresholds: Thresholds,
        min_confidence: Option<f64>,
    ) -> IdentificationResult {
        let candidates = match self.store.scan_for_fuzzy(filter).await {
            Ok(c) => c,
            Err(err) => return IdentificationResult::error_with_message(err),
        };
        if candidates.is_empty() {
            return IdentificationResult::none();
        }

        let query_fingerprint = CtphFingerprint::compute(&query.clean_text);
        let mut best_hash_idx = 0;
        let mut best_hash_score = -1.0_f64;
        for (idx, candidate) in candidates.iter().enumerate() {
            let stored = CtphFingerprint::from_stored(candidate.ctph_hash.clone());
            let score = hash::compare(&query_fingerprint, &stored);
            if score > best_hash_score {
                best_hash_score = score;
                best_hash_idx = idx;
            }
        }

        let (chosen_idx, text_score, used_text_fallback) = if best_hash_score < thresholds.fuzzy_hash_similarity {
            let mut best_text_idx = best_hash_idx;
            let mut best_text_score = -1.0_f64;
            for (idx, candidate) in candidates.iter().enumerate() {
                let score =
                    strsim::normalized_levenshtein(&query.clean_text, &candidate.clean_text) * 100.0;
                if score > best_text_score {
                    best_text_score = score;
                    best_text_idx = idx;
                }
            }
            (best_text_idx, best_text_score, true)
        } else {
            (best_hash_idx, 0.0, false)
        };

        let confidence = if used_text_fallback {
            text_score / 100.0
        } else {
            best_hash_score / 100.0
        };

        let effective_threshold = effective_threshold(thresholds.match_confidence, min_confidence);
        if confidence < effective_threshold {
            return IdentificationResult {
                hash_score: best_hash_score,
                text_score,
                ..IdentificationResult::none()
            };
        }

        let chosen = &candidates[chosen_idx];
        IdentificationResult {
            matched: Some(MatchedEpisode {
                series: chosen.series.clone(),
                season: chosen.season,
                episode: chosen.episode,
                episode_name: chosen.episode_name.clone(),
            }),
            match_confidence: confidence,
            method: if used_text_fallback {
                MatchMethod::CtphTextFallback
            } else {
                MatchMethod::Ctph
            },
            used_text_fallback,
            hash_score: best_hash_score,
            text_score,
            ambiguity_notes: None,
            error: None,
        }
    }
}

fn effective_threshold(configured: f64, min_confidence: Option<f64>) -> f64 {
    min_confidence.map_or(configured, |m| m.max(configured))
}

impl IdentificationResult {
    fn error_with_message(err: Error) -> Self {
        warn!(error = %err, "identification failed unexpectedly");
        Self::error(Error::IdentificationFailed(err.to_string()).code())
    }
}
