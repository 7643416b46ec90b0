//! [`IndexStore`] implementation backed by Turso/libSQL (§4.5).
//!
//! Concurrency discipline: the database is opened in WAL mode so readers
//! never block behind a writer; each connection gets a 5-second busy
//! timeout so a writer contending with another writer waits rather than
//! failing outright; the pool bounds the number of connections in flight.
//! There is no native vector index (§9 leaves the fuzzy-hash scheme to the
//! implementer and the embedding column has no ANN index either), so
//! `search` and `scan_for_fuzzy` brute-force scan rows satisfying the
//! filter, exactly as §4.5 specifies.

use std::sync::Arc;

use async_trait::async_trait;
use libsql::{params, Builder, Database};
use tracing::{debug, info, warn};
use uuid::Uuid;

use epimatch_core::error::{Error, Result};
use epimatch_core::index::{IndexStore, SearchFilter, SearchHit};
use epimatch_core::types::{Embedding, IndexEntry, SubtitleSourceFormat};

use crate::config::TursoConfig;
use crate::pool::ConnectionPool;
use crate::schema::SCHEMA_STATEMENTS;

fn format_source(format: SubtitleSourceFormat) -> &'static str {
    match format {
        SubtitleSourceFormat::Text => "Text",
        SubtitleSourceFormat::Pgs => "PGS",
        SubtitleSourceFormat::VobSub => "VobSub",
    }
}

fn parse_source(s: &str) -> Result<SubtitleSourceFormat> {
    match s {
        "Text" => Ok(SubtitleSourceFormat::Text),
        "PGS" => Ok(SubtitleSourceFormat::Pgs),
        "VobSub" => Ok(SubtitleSourceFormat::VobSub),
        other => Err(Error::Storage(format!("unknown source_format column value: {other}"))),
    }
}

/// The durable, SQL-backed subtitle index.
pub struct TursoStorage {
    #[allow(dead_code)]
    db: Arc<Database>,
    pool: ConnectionPool,
}

impl TursoStorage {
    /// Open (creating if absent) a local file database and run the schema.
    ///
    /// `url` accepts `file:<path>`, a bare path, or `:memory:`; a
    /// `libsql://` remote URL requires `auth_token` to be non-empty.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::Storage)` if the connection or schema setup
    /// fails.
    pub async fn connect(url: &str, auth_token: &str) -> Result<Self> {
        Self::connect_with_config(url, auth_token, TursoConfig::default()).await
    }

    /// As [`Self::connect`], with explicit pool/retry configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::Storage)` if the connection or schema setup
    /// fails, or if a `libsql://` URL is given without an auth token.
    pub async fn connect_with_config(url: &str, auth_token: &str, config: TursoConfig) -> Result<Self> {
        info!(url, "opening durable subtitle index");
        let db = if let Some(remote) = url.strip_prefix("libsql://") {
            if auth_token.trim().is_empty() {
                return Err(Error::Storage(
                    "auth token required for libsql:// remote connections".into(),
                ));
            }
            Builder::new_remote(format!("libsql://{remote}"), auth_token.to_string())
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to connect: {e}")))?
        } else if url == ":memory:" {
            Builder::new_local(":memory:")
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to open in-memory db: {e}")))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to open local db: {e}")))?
        };
        let db = Arc::new(db);
        let pool = ConnectionPool::new(Arc::clone(&db), config);
        let storage = Self { db, pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    /// Run the schema's `CREATE TABLE IF NOT EXISTS` statements and enable
    /// WAL mode. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::Storage)` on any statement failure.
    pub async fn initialize_schema(&self) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| Error::Storage(format!("failed to set WAL mode: {e}")))?;
        for stmt in SCHEMA_STATEMENTS {
            conn.execute(stmt, ())
                .await
                .map_err(|e| Error::Storage(format!("schema statement failed: {e}")))?;
        }
        debug!("schema initialized");
        Ok(())
    }

    fn row_to_entry(row: &libsql::Row) -> Result<IndexEntry> {
        let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let series: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
        let season: i64 = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
        let episode: i64 = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
        let episode_name: Option<String> = row.get(4).ok();
        let clean_text: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
        let source_format: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
        let ctph_hash: String = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;
        let embedding_blob: Option<Vec<u8>> = row.get(8).ok();

        let embedding = embedding_blob.map(|b| Embedding::from_bytes(&b)).transpose()?;

        Ok(IndexEntry {
            id: Uuid::parse_str(&id).map_err(|e| Error::Storage(format!("invalid uuid: {e}")))?,
            series,
            season: season as u32,
            episode: episode as u32,
            episode_name,
            clean_text,
            source_format: parse_source(&source_format)?,
            ctph_hash,
            embedding,
        })
    }
}

const SELECT_COLUMNS: &str = "id, series, season, episode, episode_name, clean_text, source_format, ctph_hash, embedding";

#[async_trait]
impl IndexStore for TursoStorage {
    async fn insert(&self, entry: IndexEntry) -> Result<()> {
        let conn = self.pool.acquire().await?;
        let embedding_bytes = entry.embedding.as_ref().map(Embedding::to_bytes);
        conn.execute(
            "INSERT OR REPLACE INTO index_entries \
             (id, series, season, episode, episode_name, clean_text, source_format, ctph_hash, embedding) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.id.to_string(),
                entry.series,
                entry.season,
                entry.episode,
                entry.episode_name,
                entry.clean_text,
                format_source(entry.source_format).to_string(),
                entry.ctph_hash,
                embedding_bytes,
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("insert failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IndexEntry>> {
        let conn = self.pool.acquire().await?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM index_entries WHERE id = ?");
        let mut rows = conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| Error::Storage(format!("get failed: {e}")))?;
        match rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_embedding(&self, id: Uuid, embedding: Embedding) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute(
            "UPDATE index_entries SET embedding = ? WHERE id = ?",
            params![embedding.to_bytes(), id.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("update_embedding failed: {e}")))?;
        Ok(())
    }

    async fn update_embeddings_batch(&self, updates: &[(Uuid, Embedding)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let conn = self.pool.acquire().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| Error::Storage(format!("failed to start migration batch transaction: {e}")))?;
        for (id, embedding) in updates {
            tx.execute(
                "UPDATE index_entries SET embedding = ? WHERE id = ?",
                params![embedding.to_bytes(), id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(format!("batch update_embedding failed: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| Error::Storage(format!("failed to commit migration batch: {e}")))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let conn = self.pool.acquire().await?;
        let affected = conn
            .execute("DELETE FROM index_entries WHERE id = ?", params![id.to_string()])
            .await
            .map_err(|e| Error::Storage(format!("delete failed: {e}")))?;
        Ok(affected > 0)
    }

    async fn search(
        &self,
        query: &Embedding,
        k: usize,
        min_similarity: f64,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let conn = self.pool.acquire().await?;
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM index_entries WHERE embedding IS NOT NULL");
        let mut bound: Vec<libsql::Value> = Vec::new();
        if let Some(series) = &filter.series {
            sql.push_str(" AND series = ?");
            bound.push(series.clone().into());
        }
        if let Some(season) = filter.season {
            sql.push_str(" AND season = ?");
            bound.push((i64::from(season)).into());
        }
        sql.push_str(" ORDER BY rowid ASC");

        let mut rows = conn
            .query(&sql, libsql::params_from_iter(bound))
            .await
            .map_err(|e| Error::Storage(format!("search scan failed: {e}")))?;

        // Brute-force cosine scan (§4.5/§9: no native ANN index). Stable
        // insertion order is preserved by scanning in rowid order and using
        // a stable sort for the final ranking.
        let mut hits = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let entry = Self::row_to_entry(&row)?;
            if let Some(emb) = &entry.embedding {
                let similarity = epimatch_core::embeddings::cosine_similarity(query, emb);
                if similarity >= min_similarity {
                    hits.push(SearchHit { entry, similarity });
                }
            }
        }
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn next_migration_batch(&self, cursor: Option<Uuid>, limit: usize) -> Result<Vec<IndexEntry>> {
        let conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM index_entries \
             WHERE embedding IS NULL AND clean_text != '' AND rowid > \
             COALESCE((SELECT rowid FROM index_entries WHERE id = ?), 0) \
             ORDER BY rowid ASC LIMIT ?"
        );
        let cursor_str = cursor.map_or_else(String::new, |c| c.to_string());
        let mut rows = conn
            .query(&sql, params![cursor_str, limit as i64])
            .await
            .map_err(|e| Error::Storage(format!("migration batch query failed: {e}")))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            entries.push(Self::row_to_entry(&row)?);
        }
        Ok(entries)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.pool.acquire().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM index_entries", ())
            .await
            .map_err(|e| Error::Storage(format!("count failed: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        let n: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(n as usize)
    }

    async fn count_pending_migration(&self, source_format: Option<SubtitleSourceFormat>) -> Result<usize> {
        let conn = self.pool.acquire().await?;
        let (sql, value) = match source_format {
            Some(f) => (
                "SELECT COUNT(*) FROM index_entries WHERE embedding IS NULL AND clean_text != '' AND source_format = ?",
                Some(format_source(f).to_string()),
            ),
            None => (
                "SELECT COUNT(*) FROM index_entries WHERE embedding IS NULL AND clean_text != ''",
                None,
            ),
        };
        let mut rows = if let Some(v) = value {
            conn.query(sql, params![v]).await
        } else {
            conn.query(sql, ()).await
        }
        .map_err(|e| Error::Storage(format!("count_pending_migration failed: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        let n: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(n as usize)
    }

    async fn scan_for_fuzzy(&self, filter: &SearchFilter) -> Result<Vec<IndexEntry>> {
        let conn = self.pool.acquire().await?;
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM index_entries WHERE 1=1");
        let mut bound: Vec<libsql::Value> = Vec::new();
        if let Some(series) = &filter.series {
            sql.push_str(" AND series = ?");
            bound.push(series.clone().into());
        }
        if let Some(season) = filter.season {
            sql.push_str(" AND season = ?");
            bound.push((i64::from(season)).into());
        }
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(bound))
            .await
            .map_err(|e| Error::Storage(format!("scan_for_fuzzy failed: {e}")))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            entries.push(Self::row_to_entry(&row)?);
        }
        if entries.is_empty() {
            warn!("scan_for_fuzzy returned no candidates for filter {:?}", filter);
        }
        Ok(entries)
    }
}
