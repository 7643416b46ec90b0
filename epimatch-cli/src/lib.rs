#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]

//! Command-line interface for the episode identification engine: wires
//! [`epimatch_core`]'s engine and orchestrator to a durable `IndexStore`,
//! an optional read-cache, and concrete external collaborators (embedding
//! generation, subtitle extraction, filesystem rename).

pub mod cli;
pub mod collaborators;
pub mod commands;
pub mod output;

use std::sync::Arc;

use epimatch_core::config::ConfigurationEngine;
use epimatch_core::index::IndexStore;

use cli::{Cli, Commands, ConfigCommands};
use collaborators::SubprocessEmbeddingProvider;
use commands::index::IndexCommands;

/// Open the configured durable index, optionally fronted by a redb
/// read-cache when `cache_path` is set and this binary was built with the
/// `cache` feature.
///
/// # Errors
///
/// Returns `Err` if the durable store cannot be opened, or the cache file
/// cannot be opened.
pub async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn IndexStore>> {
    let turso = Arc::new(epimatch_storage_turso::TursoStorage::connect(&cli.db_url, &cli.db_token).await?);

    #[cfg(feature = "cache")]
    if let Some(cache_path) = &cli.cache_path {
        let cached = epimatch_storage_redb::CachingIndexStore::open(cache_path, turso)?;
        return Ok(Arc::new(cached));
    }

    Ok(turso)
}

/// Dispatch a parsed [`Cli`] invocation to its handler and return the
/// process exit code.
///
/// # Errors
///
/// Returns `Err` for any failure that is not itself represented in a
/// command's own report (store connection failures, I/O errors, etc).
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config_engine = Arc::new(ConfigurationEngine::new(cli.config.clone()));
    let format = cli.format;
    let command = cli.command.clone();

    match command {
        Commands::Completion { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "epimatch", &mut std::io::stdout());
            Ok(0)
        }
        Commands::Config { command } => {
            let path = cli.config.display().to_string();
            match command {
                ConfigCommands::Validate => commands::config::validate(config_engine, path, format).await,
                ConfigCommands::Show => commands::config::show(config_engine, path, format).await,
            }
        }
        Commands::Index { command } => {
            config_engine.load()?;
            let store = open_store(&cli).await?;
            let provider = Arc::new(SubprocessEmbeddingProvider::new("epimatch-embed"));
            match command {
                IndexCommands::Migrate { batch_size } => {
                    commands::index::migrate(store, provider, batch_size, format).await
                }
                IndexCommands::Pending => commands::index::pending(store, format).await,
            }
        }
        Commands::Bulk(args) => {
            config_engine.load()?;
            let store = open_store(&cli).await?;
            let provider = Arc::new(SubprocessEmbeddingProvider::new(args.embedding_helper.clone()));
            commands::bulk::run_bulk(args, store, provider, config_engine, format).await
        }
    }
}
