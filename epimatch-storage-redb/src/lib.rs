#![allow(clippy::cast_possible_truncation)]

//! redb embedded read-cache backend in front of the durable subtitle index
//! (§4.5): a read-through cache of recently resolved [`IndexEntry`] rows,
//! keyed by id, trading a little staleness risk on direct re-fetch for
//! fewer round-trips to the durable store within a single bulk run. Never
//! the system of record.

pub mod cache;
pub mod storage;
pub mod tables;

pub use cache::{CacheConfig, CacheMetricsSnapshot};
pub use epimatch_core::types::IndexEntry;
pub use storage::CachingIndexStore;

#[cfg(test)]
mod tests {
    use super::*;
    use epimatch_core::index::test_support::InMemoryIndexStore;
    use epimatch_core::index::IndexStore;
    use epimatch_core::types::{Embedding, SubtitleSourceFormat};
    use std::sync::Arc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn sample_entry() -> IndexEntry {
        let mut values = vec![0.1f32; epimatch_core::types::EMBEDDING_DIM];
        values[0] = 1.0;
        IndexEntry {
            id: Uuid::new_v4(),
            series: "Show A".to_string(),
            season: 1,
            episode: 1,
            episode_name: None,
            clean_text: "transcript".to_string(),
            source_format: SubtitleSourceFormat::Text,
            ctph_hash: "3:abc:def".to_string(),
            embedding: Some(Embedding::new(values).unwrap()),
        }
    }

    #[tokio::test]
    async fn cache_hit_avoids_inner_roundtrip_but_stays_consistent() {
        let dir = tempdir().unwrap();
        let inner = Arc::new(InMemoryIndexStore::new());
        let entry = sample_entry();
        inner.insert(entry.clone()).await.unwrap();

        let cached = CachingIndexStore::open(dir.path().join("cache.redb"), Arc::clone(&inner)).unwrap();

        let first = cached.get(entry.id).await.unwrap().unwrap();
        assert_eq!(first.series, "Show A");
        assert_eq!(cached.metrics().misses, 1);

        let second = cached.get(entry.id).await.unwrap().unwrap();
        assert_eq!(second.series, "Show A");
        assert_eq!(cached.metrics().hits, 1);
    }

    #[tokio::test]
    async fn delete_invalidates_the_cached_row() {
        let dir = tempdir().unwrap();
        let inner = Arc::new(InMemoryIndexStore::new());
        let entry = sample_entry();
        inner.insert(entry.clone()).await.unwrap();

        let cached = CachingIndexStore::open(dir.path().join("cache.redb"), inner).unwrap();
        cached.get(entry.id).await.unwrap();
        assert!(cached.delete(entry.id).await.unwrap());
        assert!(cached.get(entry.id).await.unwrap().is_none());
    }
}
