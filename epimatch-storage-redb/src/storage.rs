//! [`CachingIndexStore`]: a redb-backed read-through cache in front of any
//! [`IndexStore`] (§4.5).
//!
//! Only single-entry lookups by id are cached — `search` and
//! `scan_for_fuzzy` always hit the inner store directly, since a cached
//! partial result would silently violate the "filter commutativity" law
//! (§8): a cache keyed on (query, filter) would need invalidation on every
//! write, which this read-through cache does not attempt. This mirrors the
//! teacher's cache layer being an accelerator for point reads, never the
//! source of truth for a query.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata};
use tracing::{debug, warn};
use uuid::Uuid;

use epimatch_core::error::{Error, Result};
use epimatch_core::index::{IndexStore, SearchFilter, SearchHit};
use epimatch_core::types::{Embedding, IndexEntry, SubtitleSourceFormat};

use crate::cache::{CacheConfig, CacheMetrics, CacheMetricsSnapshot};
use crate::tables::{CACHE_SEQUENCE_TABLE, CACHE_TABLE};

/// Wraps any `IndexStore` with a redb-backed read-through cache keyed by
/// entry id. Writes invalidate the cached row; reads populate it on miss.
pub struct CachingIndexStore<S: IndexStore> {
    inner: Arc<S>,
    db: Arc<Database>,
    config: CacheConfig,
    metrics: CacheMetrics,
    sequence: AtomicU64,
}

impl<S: IndexStore> CachingIndexStore<S> {
    /// Open (creating if absent) the cache file at `path`, fronting `inner`.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::Storage)` if the redb file cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>, inner: Arc<S>) -> Result<Self> {
        Self::open_with_config(path, inner, CacheConfig::default())
    }

    /// As [`Self::open`], with explicit cache sizing.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::Storage)` if the redb file cannot be opened.
    pub fn open_with_config(
        path: impl AsRef<std::path::Path>,
        inner: Arc<S>,
        config: CacheConfig,
    ) -> Result<Self> {
        let db = Database::create(path).map_err(|e| Error::Storage(format!("failed to open cache db: {e}")))?;
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Storage(format!("failed to begin write txn: {e}")))?;
            write_txn
                .open_table(CACHE_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open cache table: {e}")))?;
            write_txn
                .open_table(CACHE_SEQUENCE_TABLE)
                .map_err(|e| Error::Storage(format!("failed to open sequence table: {e}")))?;
            write_txn.commit().map_err(|e| Error::Storage(format!("failed to commit: {e}")))?;
        }
        Ok(Self {
            inner,
            db: Arc::new(db),
            config,
            metrics: CacheMetrics::default(),
            sequence: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn cached_get(&self, id: Uuid) -> Result<Option<IndexEntry>> {
        let read_txn = self.db.begin_read().map_err(|e| Error::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(CACHE_TABLE)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let key = id.to_string();
        match table.get(key.as_str()).map_err(|e| Error::Storage(e.to_string()))? {
            Some(bytes) => {
                let entry: IndexEntry = postcard::from_bytes(bytes.value())
                    .map_err(|e| Error::Storage(format!("cache row corrupt: {e}")))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn cache_put(&self, entry: &IndexEntry) -> Result<()> {
        let bytes = postcard::to_allocvec(entry).map_err(|e| Error::Storage(e.to_string()))?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = entry.id.to_string();
        let write_txn = self.db.begin_write().map_err(|e| Error::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(CACHE_TABLE)
                .map_err(|e| Error::Storage(e.to_string()))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| Error::Storage(e.to_string()))?;
            let mut seq_table = write_txn
                .open_table(CACHE_SEQUENCE_TABLE)
                .map_err(|e| Error::Storage(e.to_string()))?;
            seq_table.insert(key.as_str(), seq).map_err(|e| Error::Storage(e.to_string()))?;
            if seq_table.len().map_err(|e| Error::Storage(e.to_string()))? as usize > self.config.max_entries {
                self.evict_oldest(&mut table, &mut seq_table)?;
            }
        }
        write_txn.commit().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    fn evict_oldest(
        &self,
        table: &mut redb::Table<'_, &str, &[u8]>,
        seq_table: &mut redb::Table<'_, &str, u64>,
    ) -> Result<()> {
        let oldest_key = seq_table
            .iter()
            .map_err(|e| Error::Storage(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .min_by_key(|(_, seq)| seq.value())
            .map(|(k, _)| k.value().to_string());
        if let Some(key) = oldest_key {
            table.remove(key.as_str()).map_err(|e| Error::Storage(e.to_string()))?;
            seq_table.remove(key.as_str()).map_err(|e| Error::Storage(e.to_string()))?;
            self.metrics.record_eviction();
        }
        Ok(())
    }

    fn cache_invalidate(&self, id: Uuid) -> Result<()> {
        let key = id.to_string();
        let write_txn = self.db.begin_write().map_err(|e| Error::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(CACHE_TABLE)
                .map_err(|e| Error::Storage(e.to_string()))?;
            table.remove(key.as_str()).map_err(|e| Error::Storage(e.to_string()))?;
            let mut seq_table = write_txn
                .open_table(CACHE_SEQUENCE_TABLE)
                .map_err(|e| Error::Storage(e.to_string()))?;
            seq_table.remove(key.as_str()).map_err(|e| Error::Storage(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl<S: IndexStore + 'static> IndexStore for CachingIndexStore<S> {
    async fn insert(&self, entry: IndexEntry) -> Result<()> {
        self.inner.insert(entry.clone()).await?;
        self.cache_put(&entry)
    }

    async fn get(&self, id: Uuid) -> Result<Option<IndexEntry>> {
        if let Some(entry) = self.cached_get(id)? {
            self.metrics.record_hit();
            debug!(%id, "cache hit");
            return Ok(Some(entry));
        }
        self.metrics.record_miss();
        match self.inner.get(id).await? {
            Some(entry) => {
                self.cache_put(&entry)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn update_embedding(&self, id: Uuid, embedding: Embedding) -> Result<()> {
        self.inner.update_embedding(id, embedding).await?;
        self.cache_invalidate(id)
    }

    async fn update_embeddings_batch(&self, updates: &[(Uuid, Embedding)]) -> Result<()> {
        self.inner.update_embeddings_batch(updates).await?;
        for (id, _) in updates {
            self.cache_invalidate(*id)?;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self.inner.delete(id).await?;
        self.cache_invalidate(id)?;
        Ok(deleted)
    }

    async fn search(
        &self,
        query: &Embedding,
        k: usize,
        min_similarity: f64,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        self.inner.search(query, k, min_similarity, filter).await
    }

    async fn next_migration_batch(&self, cursor: Option<Uuid>, limit: usize) -> Result<Vec<IndexEntry>> {
        self.inner.next_migration_batch(cursor, limit).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn count_pending_migration(&self, source_format: Option<SubtitleSourceFormat>) -> Result<usize> {
        self.inner.count_pending_migration(source_format).await
    }

    async fn scan_for_fuzzy(&self, filter: &SearchFilter) -> Result<Vec<IndexEntry>> {
        if filter.series.is_some() || filter.season.is_some() {
            warn!("scan_for_fuzzy bypasses the cache; filters are never cached");
        }
        self.inner.scan_for_fuzzy(filter).await
    }
}
