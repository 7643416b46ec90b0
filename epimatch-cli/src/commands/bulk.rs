//! `epimatch bulk`: drives the bulk orchestrator over one or more paths and
//! reports the aggregate outcome, exiting with the code demanded by §8's
//! literal CLI surface (0 Completed, 2 CompletedWithWarnings, 3 Failed, 4
//! Cancelled).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use epimatch_core::bulk::BulkOrchestrator;
use epimatch_core::config::ConfigurationEngine;
use epimatch_core::embeddings::EmbeddingProvider;
use epimatch_core::index::IndexStore;
use epimatch_core::progress::ProgressTracker;
use epimatch_core::types::{BulkOptions, BulkPhase, BulkRequest, FileProcessingResult, FileStatus};
use epimatch_core::IdentificationEngine;

use crate::collaborators::{DryRunRenameActor, FilesystemRenameActor, SubprocessSubtitleExtractor};
use crate::output::{Output, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct BulkArgs {
    /// Root path to scan; repeatable.
    #[arg(long = "path", required = true)]
    pub paths: Vec<PathBuf>,

    /// Recurse into subdirectories.
    #[arg(long, default_value_t = true)]
    pub recursive: bool,

    /// Maximum recursion depth (unlimited if omitted).
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Only consider files with this extension; repeatable.
    #[arg(long = "include-ext")]
    pub include_ext: Vec<String>,

    /// Skip files with this extension; repeatable.
    #[arg(long = "exclude-ext")]
    pub exclude_ext: Vec<String>,

    /// Number of files discovered per batch.
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    /// Maximum files processed concurrently within a batch.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Per-file timeout, in seconds.
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Keep processing after a per-file error instead of aborting the run.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Abort after this many per-file errors (unlimited if omitted).
    #[arg(long)]
    pub max_errors: Option<usize>,

    /// Path to the embedding helper binary.
    #[arg(long, default_value = "epimatch-embed")]
    pub embedding_helper: PathBuf,

    /// Path to the subtitle extraction helper binary.
    #[arg(long, default_value = "epimatch-extract-subs")]
    pub subtitle_helper: PathBuf,

    /// Propose renames but do not execute them.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkReport {
    pub request_id: String,
    pub phase: BulkPhase,
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub file_results: Vec<FileProcessingResult>,
}

impl Output for BulkReport {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}", "Bulk identification run".bold())?;
        writeln!(writer, "{}", "-".repeat(40))?;
        writeln!(writer, "Request:   {}", self.request_id)?;
        writeln!(writer, "Phase:     {:?}", self.phase)?;
        writeln!(writer, "Files:     {} total", self.total_files)?;
        writeln!(
            writer,
            "Processed: {} ok, {} failed, {} skipped",
            self.processed_files, self.failed_files, self.skipped_files
        )?;
        for result in &self.file_results {
            let label = match result.status {
                FileStatus::Success => "OK".green(),
                FileStatus::Failed => "FAIL".red(),
                FileStatus::Skipped => "SKIP".yellow(),
                FileStatus::Cancelled => "CANCELLED".yellow(),
                FileStatus::Processing => "PROCESSING".normal(),
            };
            write!(writer, "  [{label}] {}", result.file_path.display())?;
            if let Some(ident) = &result.identification {
                if let Some(matched) = &ident.matched {
                    write!(
                        writer,
                        " -> {} S{:02}E{:02} ({:.2})",
                        matched.series, matched.season, matched.episode, ident.match_confidence
                    )?;
                }
            }
            if let Some(err) = &result.error {
                write!(writer, " ({err})")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Wires up an identification engine, orchestrator, and progress bar, runs
/// the request, and returns the process exit code.
///
/// # Errors
///
/// Returns `Err` if the request fails to validate or a store-level error
/// aborts the run; per-file failures are reported in [`BulkReport`]
/// instead of surfacing here.
pub async fn run_bulk(
    args: BulkArgs,
    store: Arc<dyn IndexStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    config_engine: Arc<ConfigurationEngine>,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let options = BulkOptions {
        batch_size: args.batch_size,
        max_concurrency: args.concurrency,
        progress_interval_ms: 500,
        max_errors_before_abort: args.max_errors,
        file_timeout: Duration::from_secs(args.timeout),
        recursive: args.recursive,
        max_depth: args.max_depth,
        include_exts: args.include_ext.clone(),
        exclude_exts: args.exclude_ext.clone(),
        continue_on_error: args.continue_on_error,
        create_backups: false,
        force_gc: false,
    };
    let request = BulkRequest { request_id: request_id.clone(), paths: args.paths.clone(), options };

    let engine = Arc::new(IdentificationEngine::new(Arc::clone(&store), embedding_provider));
    let extractor = Arc::new(SubprocessSubtitleExtractor::new(args.subtitle_helper.clone()));
    let renamer: Arc<dyn epimatch_core::bulk::RenameActor> = if args.dry_run {
        Arc::new(DryRunRenameActor)
    } else {
        Arc::new(FilesystemRenameActor)
    };
    let progress = Arc::new(ProgressTracker::new());

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    {
        let bar = bar.clone();
        progress.subscribe(move |_request_id, snapshot| {
            bar.set_length(snapshot.total_files as u64);
            bar.set_position(snapshot.processed_files as u64);
            bar.set_message(format!("{:?}", snapshot.phase));
        });
    }

    let orchestrator = BulkOrchestrator::new(engine, extractor, renamer, config_engine, progress);
    let outcome = orchestrator.process(request).await?;
    bar.finish_and_clear();

    let report = BulkReport {
        request_id: outcome.request_id,
        phase: outcome.phase,
        total_files: outcome.total_files,
        processed_files: outcome.progress.processed_files,
        failed_files: outcome.progress.failed_files,
        skipped_files: outcome.progress.skipped_files,
        file_results: outcome.file_results,
    };
    let exit_code = exit_code_for(report.phase);
    format.print_output(&report)?;
    Ok(exit_code)
}

fn exit_code_for(phase: BulkPhase) -> i32 {
    match phase {
        BulkPhase::Completed => 0,
        BulkPhase::CompletedWithWarnings => 2,
        BulkPhase::Failed => 3,
        BulkPhase::Cancelled => 4,
        BulkPhase::Initializing | BulkPhase::Validating | BulkPhase::Discovery | BulkPhase::Processing => 3,
    }
}
