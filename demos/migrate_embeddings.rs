//! Backfills embeddings for index rows inserted before an embedding
//! provider was available, using the deterministic test provider as a
//! stand-in for a real ONNX helper.
//!
//! Usage:
//!   EPIMATCH_DB_URL=file:./data/index.db cargo run -p epimatch-demos --bin migrate_embeddings

use std::sync::Arc;

use anyhow::Result;
use epimatch_core::embeddings::provider::test_support::DeterministicProvider;
use epimatch_core::index::migration;
use epimatch_core::types::SubtitleSourceFormat;
use epimatch_storage_turso::TursoStorage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let db_url = std::env::var("EPIMATCH_DB_URL").unwrap_or_else(|_| "file:migration-demo.db".to_string());
    let auth_token = std::env::var("EPIMATCH_DB_TOKEN").unwrap_or_default();

    println!("Connecting to {db_url}");
    let storage = TursoStorage::connect(&db_url, &auth_token).await?;

    let pending = migration::pending_count(&storage, Some(SubtitleSourceFormat::Text)).await?;
    println!("rows pending migration: {pending}");

    let provider: Arc<dyn epimatch_core::embeddings::EmbeddingProvider> = Arc::new(DeterministicProvider::default());
    let report = migration::run(&storage, provider, 100).await?;

    println!("migration complete:");
    println!("  batches processed: {}", report.batches_processed);
    println!("  rows migrated:     {}", report.rows_migrated);
    println!("  rows failed:       {}", report.rows_failed);

    let remaining = migration::pending_count(&storage, None).await?;
    println!("rows still pending: {remaining}");

    Ok(())
}
