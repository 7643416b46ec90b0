#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

//! Turso/libSQL durable storage backend for the subtitle identification
//! index (§4.5).
//!
//! [`TursoStorage`] implements [`epimatch_core::index::IndexStore`] over a
//! WAL-mode SQLite-compatible database (local file or a remote `libsql://`
//! endpoint), with a bounded connection pool and a brute-force cosine scan
//! for vector search (there is no native ANN index; see §9).
//!
//! When the `cache` feature is enabled, [`epimatch_storage_redb`] can front
//! this store with a read-through cache via
//! [`epimatch_storage_redb::CachingIndexStore`] — this crate remains the
//! system of record either way.

pub mod config;
pub mod pool;
pub mod schema;
pub mod storage;

pub use config::TursoConfig;
pub use pool::ConnectionPool;
pub use storage::TursoStorage;

#[cfg(test)]
mod tests {
    use super::*;
    use epimatch_core::index::{IndexStore, SearchFilter};
    use epimatch_core::types::{Embedding, IndexEntry, SubtitleSourceFormat};
    use uuid::Uuid;

    fn embedding_from_seed(seed: f32) -> Embedding {
        let mut values = vec![0.0f32; epimatch_core::types::EMBEDDING_DIM];
        values[0] = seed;
        values[1] = (1.0 - seed * seed).max(0.0).sqrt();
        Embedding::new(values).unwrap()
    }

    fn sample_entry(series: &str, with_embedding: bool) -> IndexEntry {
        IndexEntry {
            id: Uuid::new_v4(),
            series: series.to_string(),
            season: 1,
            episode: 1,
            episode_name: Some("Pilot".to_string()),
            clean_text: format!("{series} transcript"),
            source_format: SubtitleSourceFormat::Text,
            ctph_hash: "3:abc:def".to_string(),
            embedding: with_embedding.then(|| embedding_from_seed(0.5)),
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let storage = TursoStorage::connect(":memory:", "").await.unwrap();
        let entry = sample_entry("Show A", true);
        storage.insert(entry.clone()).await.unwrap();
        let fetched = storage.get(entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.series, "Show A");
        assert_eq!(fetched.embedding.unwrap().as_slice().len(), epimatch_core::types::EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn search_filters_by_series_and_season() {
        let storage = TursoStorage::connect(":memory:", "").await.unwrap();
        let a = sample_entry("Show A", true);
        let mut b = sample_entry("Show B", true);
        b.season = 2;
        storage.insert(a.clone()).await.unwrap();
        storage.insert(b).await.unwrap();

        let filter = SearchFilter { series: Some("Show A".to_string()), season: None };
        let hits = storage
            .search(a.embedding.as_ref().unwrap(), 10, 0.0, &filter)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.series, "Show A");
    }

    #[tokio::test]
    async fn migration_batch_excludes_entries_with_embeddings() {
        let storage = TursoStorage::connect(":memory:", "").await.unwrap();
        storage.insert(sample_entry("Pending", false)).await.unwrap();
        storage.insert(sample_entry("Done", true)).await.unwrap();

        let batch = storage.next_migration_batch(None, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].series, "Pending");
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let storage = TursoStorage::connect(":memory:", "").await.unwrap();
        let entry = sample_entry("Show A", true);
        storage.insert(entry.clone()).await.unwrap();
        assert!(storage.delete(entry.id).await.unwrap());
        assert!(!storage.delete(entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn count_and_count_pending_migration_track_backfill_state() {
        let storage = TursoStorage::connect(":memory:", "").await.unwrap();
        storage.insert(sample_entry("Show A", false)).await.unwrap();
        storage.insert(sample_entry("Show B", true)).await.unwrap();

        assert_eq!(storage.count().await.unwrap(), 2);
        assert_eq!(storage.count_pending_migration(None).await.unwrap(), 1);
    }
}
