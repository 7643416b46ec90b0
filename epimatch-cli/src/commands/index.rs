//! `epimatch index migrate` — the CLI surface for the embedding backfill
//! migration, supplementing the distilled spec's CLI section with an entry
//! point for an already-specified [MODULE] (§6 of SPEC_FULL.md).

use std::sync::Arc;

use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;

use epimatch_core::embeddings::EmbeddingProvider;
use epimatch_core::index::{migration, IndexStore};

use crate::output::{Output, OutputFormat};

#[derive(Subcommand, Debug, Clone)]
pub enum IndexCommands {
    /// Backfill embeddings for index rows that have clean text but no
    /// embedding yet.
    Migrate {
        /// Rows fetched and embedded per batch.
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Count rows still pending embedding backfill.
    Pending,
}

#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub batches_processed: usize,
    pub rows_migrated: usize,
    pub rows_failed: usize,
}

impl Output for MigrationReport {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}", "Embedding migration".bold())?;
        writeln!(writer, "  batches processed: {}", self.batches_processed)?;
        writeln!(writer, "  rows migrated:     {}", self.rows_migrated)?;
        writeln!(writer, "  rows failed:       {}", self.rows_failed)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct PendingReport {
    pub pending: usize,
}

impl Output for PendingReport {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "pending: {}", self.pending)
    }
}

/// # Errors
///
/// Returns `Err` on a store-level failure; per-row embedding failures are
/// recorded in the returned [`MigrationReport`] instead.
pub async fn migrate(
    store: Arc<dyn IndexStore>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let result = migration::run(store.as_ref(), provider, batch_size).await?;
    let report = MigrationReport {
        batches_processed: result.batches_processed,
        rows_migrated: result.rows_migrated,
        rows_failed: result.rows_failed,
    };
    format.print_output(&report)?;
    Ok(i32::from(report.rows_failed > 0) * 2)
}

/// # Errors
///
/// Returns `Err` on a store-level failure.
pub async fn pending(store: Arc<dyn IndexStore>, format: OutputFormat) -> anyhow::Result<i32> {
    let count = migration::pending_count(store.as_ref(), None).await?;
    format.print_output(&PendingReport { pending: count })?;
    Ok(0)
}
