//! Top-level argument parsing, mirroring the teacher's `Cli`/`Commands`
//! split: one struct with global flags, one subcommand enum, one module per
//! subcommand under `commands/`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::bulk::BulkArgs;
use crate::commands::index::IndexCommands;
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "epimatch")]
#[command(about = "Identifies TV episodes from video files by subtitle content")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Path to the JSON matching configuration.
    #[arg(short, long, value_name = "FILE", env = "EPIMATCH_CONFIG_PATH", default_value = "epimatch.config.json")]
    pub config: PathBuf,

    /// Database URL for the durable subtitle index (`file:path`, `:memory:`, or `libsql://...`).
    #[arg(long, value_name = "URL", default_value = "epimatch.db")]
    pub db_url: String,

    /// Auth token for a `libsql://` remote database.
    #[arg(long, env = "EPIMATCH_DB_TOKEN", default_value = "")]
    pub db_token: String,

    /// Path to an optional redb read-cache file. Omit to query the durable
    /// store directly.
    #[arg(long, value_name = "FILE")]
    pub cache_path: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Enable debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Identify TV episodes across one or more files or directories.
    Bulk(BulkArgs),
    /// Configuration loading and validation.
    #[command(alias = "cfg")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Index maintenance.
    #[command(alias = "idx")]
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
    /// Generate shell completion scripts.
    #[command(alias = "comp")]
    Completion {
        /// Shell to generate completion for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Load and validate the configuration file, printing any violation.
    Validate,
    /// Print the active, validated configuration snapshot.
    Show,
}
