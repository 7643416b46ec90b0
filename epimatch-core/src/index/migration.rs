//! Idempotent batch backfill of embeddings for index rows that have
//! `cleanText` but no `embedding` yet.

use std::sync::Arc;

use tracing::{info, warn};

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::index::IndexStore;
use crate::types::SubtitleSourceFormat;

/// Outcome of one `run` call.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub batches_processed: usize,
    pub rows_migrated: usize,
    pub rows_failed: usize,
}

/// Backfill embeddings in batches of `batch_size` rows until the store
/// reports no more rows qualify (`embedding IS NULL AND cleanText IS NOT
/// NULL`).
///
/// Each batch is fetched, embedded, and written back to the store
/// independently: a per-row embedding failure is counted in the report but
/// does not abort the batch, matching §4.5. Running this twice over the
/// same store is a no-op on the second run (the idempotent-migration law in
/// §8): once every row has an embedding, `next_migration_batch` returns
/// empty and the loop exits immediately.
///
/// # Errors
///
/// Returns `Err` only on a store-level failure (fetch or write); per-row
/// embedding failures are recorded in the returned [`MigrationReport`]
/// instead of aborting.
pub async fn run(
    store: &dyn IndexStore,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    let mut cursor = None;

    loop {
        let batch = store.next_migration_batch(cursor, batch_size).await?;
        if batch.is_empty() {
            break;
        }

        cursor = batch.last().map(|e| e.id);
        report.batches_processed += 1;

        let mut updates = Vec::with_capacity(batch.len());
        for entry in &batch {
            match provider.generate(&entry.clean_text).await {
                Ok(embedding) => updates.push((entry.id, embedding)),
                Err(err) => {
                    warn!(entry_id = %entry.id, error = %err, "embedding backfill failed for row");
                    report.rows_failed += 1;
                }
            }
        }

        if !updates.is_empty() {
            store.update_embeddings_batch(&updates).await?;
            report.rows_migrated += updates.len();
        }

        info!(
            batch = report.batches_processed,
            migrated = report.rows_migrated,
            failed = report.rows_failed,
            "migration batch complete"
        );
    }

    Ok(report)
}

/// Count of rows still pending backfill, optionally narrowed to one
/// `SubtitleSourceFormat`. Used for `estimate`-style diagnostics.
///
/// # Errors
///
/// Propagates the store's own error.
pub async fn pending_count(
    store: &dyn IndexStore,
    source_format: Option<SubtitleSourceFormat>,
) -> Result<usize> {
    store.count_pending_migration(source_format).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::test_support::DeterministicProvider;
    use crate::index::test_support::InMemoryIndexStore;
    use crate::types::IndexEntry;
    use uuid::Uuid;

    fn entry_without_embedding(series: &str) -> IndexEntry {
        IndexEntry {
            id: Uuid::new_v4(),
            series: series.to_string(),
            season: 1,
            episode: 1,
            episode_name: None,
            clean_text: format!("{series} transcript text"),
            source_format: SubtitleSourceFormat::Text,
            ctph_hash: "3::".to_string(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn backfills_all_pending_rows_across_batches() {
        let store = InMemoryIndexStore::seeded(vec![
            entry_without_embedding("A"),
            entry_without_embedding("B"),
            entry_without_embedding("C"),
        ]);
        let provider = Arc::new(DeterministicProvider::default());

        let report = run(&store, provider, 2).await.unwrap();

        assert_eq!(report.rows_migrated, 3);
        assert_eq!(report.rows_failed, 0);
        assert_eq!(report.batches_processed, 2);
        assert_eq!(store.count_pending_migration(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_run_is_idempotent_no_op() {
        let store = InMemoryIndexStore::seeded(vec![entry_without_embedding("A")]);
        let provider = Arc::new(DeterministicProvider::default());

        let first = run(&store, provider.clone(), 10).await.unwrap();
        assert_eq!(first.rows_migrated, 1);

        let second = run(&store, provider, 10).await.unwrap();
        assert_eq!(second.rows_migrated, 0);
        assert_eq!(second.batches_processed, 0);
    }
}
