//! Environment-variable operator overrides, applied after a successful file
//! load per §4.4's ambient supplement: these are operational knobs, not
//! hot-reload inputs, so they bypass the stability policy entirely and are
//! re-applied on every load/reload rather than persisted.
//!
//! Grounded on `memory-cli/src/config/loader/env.rs`'s `MEMORY_CLI_CONFIG`
//! env-var convention, generalized from "pick the config file" to also
//! cover a couple of value overrides the way `do-memory-core::MemoryConfig::from_env`
//! overlays individual fields onto an already-loaded config.

use tracing::{info, warn};

use crate::types::{Configuration, MatchingStrategy};

/// Env var naming the config file path; wired as a clap `env` fallback on
/// the CLI's `--config` flag rather than read here, matching how
/// `--db-token` already falls back to `EPIMATCH_DB_TOKEN`.
pub const CONFIG_PATH_VAR: &str = "EPIMATCH_CONFIG_PATH";
/// Overrides `Configuration::max_concurrency` when set to a valid positive
/// integer; invalid or non-numeric values are ignored with a warning.
pub const MAX_CONCURRENCY_VAR: &str = "EPIMATCH_MAX_CONCURRENCY";
/// Overrides `Configuration::matching_strategy` when set to one of
/// `embedding`, `fuzzy`, `hybrid` (case-insensitive).
pub const MATCHING_STRATEGY_VAR: &str = "EPIMATCH_MATCHING_STRATEGY";

/// Overlay `EPIMATCH_MAX_CONCURRENCY`/`EPIMATCH_MATCHING_STRATEGY` onto an
/// already-loaded, already-validated configuration. Applied unconditionally
/// after the stability policy and validation have run, so an override can
/// never be rejected by or interact with either; it simply replaces the
/// field in the returned snapshot.
pub fn apply_overrides(mut config: Configuration) -> Configuration {
    if let Ok(raw) = std::env::var(MAX_CONCURRENCY_VAR) {
        match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => {
                info!(value = n, "overriding maxConcurrency from {MAX_CONCURRENCY_VAR}");
                config.max_concurrency = n;
            }
            _ => warn!(raw, "ignoring invalid {MAX_CONCURRENCY_VAR} value"),
        }
    }

    if let Ok(raw) = std::env::var(MATCHING_STRATEGY_VAR) {
        match parse_strategy(&raw) {
            Some(strategy) => {
                info!(?strategy, "overriding matchingStrategy from {MATCHING_STRATEGY_VAR}");
                config.matching_strategy = strategy;
            }
            None => warn!(raw, "ignoring invalid {MATCHING_STRATEGY_VAR} value"),
        }
    }

    config
}

fn parse_strategy(raw: &str) -> Option<MatchingStrategy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "embedding" => Some(MatchingStrategy::Embedding),
        "fuzzy" => Some(MatchingStrategy::Fuzzy),
        "hybrid" => Some(MatchingStrategy::Hybrid),
        _ => None,
    }
}
