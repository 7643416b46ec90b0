//! The persistent index contract and embedding-backfill migration.

pub mod migration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Embedding, IndexEntry, SubtitleSourceFormat};

/// Optional narrowing applied to a top-K vector search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub series: Option<String>,
    pub season: Option<u32>,
}

impl SearchFilter {
    #[must_use]
    pub fn matches(&self, entry: &IndexEntry) -> bool {
        self.series.as_deref().is_none_or(|s| s == entry.series)
            && self.season.is_none_or(|s| s == entry.season)
    }
}

/// One scored search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: IndexEntry,
    pub similarity: f64,
}

/// A keyed store of subtitle fingerprints, searchable by cosine similarity
/// over the embedding column and optionally filtered by series/season.
///
/// Implementations are responsible for the concurrency discipline described
/// in §4.5: write-ahead logging, a bounded connection pool, and a bounded
/// busy-wait on write contention. This trait only describes the logical
/// contract; backend crates (`epimatch-storage-turso`,
/// `epimatch-storage-redb`) provide it.
///
/// # Errors
///
/// All operations return `Err` on storage-layer failure (`Error::Storage`
/// or `Error::Io`), which the bulk orchestrator classifies as a retryable
/// `FileAccessError`.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert a new entry. Entry ids must be caller-generated and unique.
    async fn insert(&self, entry: IndexEntry) -> Result<()>;

    /// Fetch a single entry by id.
    async fn get(&self, id: Uuid) -> Result<Option<IndexEntry>>;

    /// Update the stored `cleanText`/`embedding`/`ctphHash` for an existing
    /// entry. Used by migration and re-indexing; never called for any
    /// other field after insert.
    async fn update_embedding(&self, id: Uuid, embedding: Embedding) -> Result<()>;

    /// Apply every `(id, embedding)` pair from one migration batch
    /// atomically, per §4.5's "update inside a single transaction per
    /// batch": either the whole batch's writes land, or a store-level
    /// failure leaves none of them applied. Per-row embedding-generation
    /// failures never reach this method — the caller (§index::migration)
    /// filters those out before calling, since only rows that were
    /// successfully embedded are written.
    ///
    /// The default implementation applies updates one at a time, which is
    /// sufficient for stores with no partial-write failure mode to guard
    /// against (e.g. the in-memory test double); a durable backend should
    /// override this with a real transaction.
    async fn update_embeddings_batch(&self, updates: &[(Uuid, Embedding)]) -> Result<()> {
        for (id, embedding) in updates {
            self.update_embedding(*id, embedding.clone()).await?;
        }
        Ok(())
    }

    /// Delete an entry by id. `Ok(false)` if no such entry existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Top-K nearest neighbors by cosine similarity over rows with a
    /// non-null embedding, satisfying `filter`, with similarity at least
    /// `min_similarity`. Results are sorted descending by similarity; ties
    /// are broken by stable insertion order.
    async fn search(
        &self,
        query: &Embedding,
        k: usize,
        min_similarity: f64,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Fetch a page of entries whose `embedding` is `NULL` and whose
    /// `cleanText` is non-empty, for the migration backfill. `cursor` is an
    /// opaque continuation token; `None` starts from the beginning.
    async fn next_migration_batch(
        &self,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>>;

    /// Total number of stored entries, used for estimate/diagnostic
    /// reporting.
    async fn count(&self) -> Result<usize>;

    /// Number of stored entries matching `source_format` still missing an
    /// embedding.
    async fn count_pending_migration(&self, source_format: Option<SubtitleSourceFormat>) -> Result<usize>;

    /// Fetch every entry satisfying `filter`, for the CTPH (fuzzy) path to
    /// score locally. There is no native fuzzy-hash index (§9 leaves the
    /// internal scheme to the implementer); backends instead return the
    /// filtered candidate set and the identification engine scores each
    /// fingerprint in-process.
    async fn scan_for_fuzzy(&self, filter: &SearchFilter) -> Result<Vec<IndexEntry>>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory `IndexStore` used by this crate's own tests and, behind
    /// the `test-support` feature, by other workspace crates.
    #[derive(Default)]
    pub struct InMemoryIndexStore {
        entries: Mutex<Vec<IndexEntry>>,
    }

    impl InMemoryIndexStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn seeded(entries: Vec<IndexEntry>) -> Self {
            Self {
                entries: Mutex::new(entries),
            }
        }
    }

    #[async_trait]
    impl IndexStore for InMemoryIndexStore {
        async fn insert(&self, entry: IndexEntry) -> Result<()> {
            self.entries.lock().expect("lock poisoned").push(entry);
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<IndexEntry>> {
            Ok(self
                .entries
                .lock()
                .expect("lock poisoned")
                .iter()
                .find(|e| e.id == id)
                .cloned())
        }

        async fn update_embedding(&self, id: Uuid, embedding: Embedding) -> Result<()> {
            let mut entries = self.entries.lock().expect("lock poisoned");
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                entry.embedding = Some(embedding);
            }
            Ok(())
        }

        async fn delete(&self, id: Uuid) -> Result<bool> {
            let mut entries = self.entries.lock().expect("lock poisoned");
            let before = entries.len();
            entries.retain(|e| e.id != id);
            Ok(entries.len() != before)
        }

        async fn search(
            &self,
            query: &Embedding,
            k: usize,
            min_similarity: f64,
            filter: &SearchFilter,
        ) -> Result<Vec<SearchHit>> {
            let entries = self.entries.lock().expect("lock poisoned");
            let mut hits: Vec<SearchHit> = entries
                .iter()
                .filter(|e| filter.matches(e))
                .filter_map(|e| {
                    let emb = e.embedding.as_ref()?;
                    let similarity = crate::embeddings::cosine_similarity(query, emb);
                    Some(SearchHit { entry: e.clone(), similarity })
                })
                .filter(|hit| hit.similarity >= min_similarity)
                .collect();
            // Stable sort preserves insertion order for ties.
            hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(k);
            Ok(hits)
        }

        async fn next_migration_batch(
            &self,
            cursor: Option<Uuid>,
            limit: usize,
        ) -> Result<Vec<IndexEntry>> {
            let entries = self.entries.lock().expect("lock poisoned");
            let start_idx = cursor
                .and_then(|c| entries.iter().position(|e| e.id == c).map(|p| p + 1))
                .unwrap_or(0);
            Ok(entries
                .iter()
                .skip(start_idx)
                .filter(|e| e.needs_embedding_backfill())
                .take(limit)
                .cloned()
                .collect())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.entries.lock().expect("lock poisoned").len())
        }

        async fn count_pending_migration(&self, source_format: Option<SubtitleSourceFormat>) -> Result<usize> {
            Ok(self
                .entries
                .lock()
                .expect("lock poisoned")
                .iter()
                .filter(|e| source_format.is_none_or(|f| f == e.source_format))
                .filter(|e| e.needs_embedding_backfill())
                .count())
        }

        async fn scan_for_fuzzy(&self, filter: &SearchFilter) -> Result<Vec<IndexEntry>> {
            Ok(self
                .entries
                .lock()
                .expect("lock poisoned")
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect())
        }
    }
}
