//! `epimatch config validate`/`epimatch config show` — the CLI surface for
//! the Configuration Engine, supplementing the distilled spec's CLI section
//! with entry points for an already-specified [MODULE] (§6 of SPEC_FULL.md).

use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use epimatch_core::config::ConfigurationEngine;
use epimatch_core::types::Configuration;

use crate::output::{Output, OutputFormat};

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub path: String,
    pub valid: bool,
    pub error: Option<String>,
    pub config: Option<Configuration>,
}

impl Output for ConfigReport {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.valid {
            writeln!(writer, "{} {}", "valid:".green().bold(), self.path)?;
            if let Some(config) = &self.config {
                writeln!(writer, "  version:           {}", config.version)?;
                writeln!(writer, "  matchingStrategy:  {:?}", config.matching_strategy)?;
                writeln!(writer, "  maxConcurrency:    {}", config.max_concurrency)?;
                for (format, thresholds) in &config.thresholds {
                    writeln!(
                        writer,
                        "  thresholds[{format}]: matchConfidence={:.2} renameConfidence={:.2} fuzzyHashSimilarity={:.1}",
                        thresholds.match_confidence, thresholds.rename_confidence, thresholds.fuzzy_hash_similarity
                    )?;
                }
            }
        } else {
            writeln!(writer, "{} {}", "invalid:".red().bold(), self.path)?;
            if let Some(err) = &self.error {
                writeln!(writer, "  {err}")?;
            }
        }
        Ok(())
    }
}

/// Load and validate the configuration file; never returns `Err` for an
/// invalid file — the failure is reported in [`ConfigReport`] instead, so
/// the CLI can still print a structured diagnosis.
pub async fn validate(engine: Arc<ConfigurationEngine>, path: String, format: OutputFormat) -> anyhow::Result<i32> {
    let report = match engine.load() {
        Ok(config) => ConfigReport { path, valid: true, error: None, config: Some(config) },
        Err(e) => ConfigReport { path, valid: false, error: Some(e.to_string()), config: None },
    };
    let exit_code = i32::from(!report.valid);
    format.print_output(&report)?;
    Ok(exit_code)
}

/// Print the currently active configuration snapshot, loading it first if
/// no prior `load` has happened on this engine.
///
/// # Errors
///
/// Returns `Err` if the configuration cannot be loaded at all.
pub async fn show(engine: Arc<ConfigurationEngine>, path: String, format: OutputFormat) -> anyhow::Result<i32> {
    let config = match engine.current() {
        Some(config) => config,
        None => engine.load()?,
    };
    let report = ConfigReport { path, valid: true, error: None, config: Some(config) };
    format.print_output(&report)?;
    Ok(0)
}
