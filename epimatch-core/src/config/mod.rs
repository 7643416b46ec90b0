//! Configuration loading, hot-reload, and the match-confidence stability
//! policy.

pub mod env;
mod raw;
mod stability;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::{Configuration, SubtitleSourceFormat};

pub use raw::{parse_lenient, parse_strict};

/// Validate a fully parsed [`Configuration`] against §4.4's rules.
///
/// # Errors
///
/// Returns `Err(Error::InvalidInput)` describing the first violation found.
pub fn validate(config: &Configuration) -> Result<()> {
    if config.thresholds.is_empty() {
        return Err(Error::InvalidInput("no thresholds configured for any source format".into()));
    }
    for (format, t) in &config.thresholds {
        if !(0.0..=1.0).contains(&t.match_confidence) {
            return Err(Error::InvalidInput(format!(
                "{format}: matchConfidence must be in [0,1], got {}",
                t.match_confidence
            )));
        }
        if !(0.0..=1.0).contains(&t.embed_similarity) {
            return Err(Error::InvalidInput(format!(
                "{format}: embedSimilarity must be in [0,1], got {}",
                t.embed_similarity
            )));
        }
        if !(0.0..=100.0).contains(&t.fuzzy_hash_similarity) {
            return Err(Error::InvalidInput(format!(
                "{format}: fuzzyHashSimilarity must be in [0,100], got {}",
                t.fuzzy_hash_similarity
            )));
        }
        if t.rename_confidence < t.match_confidence {
            return Err(Error::InvalidInput(format!(
                "{format}: renameConfidence ({}) must be >= matchConfidence ({})",
                t.rename_confidence, t.match_confidence
            )));
        }
    }
    if !(1..=400).contains(&config.max_concurrency) {
        return Err(Error::InvalidInput(format!(
            "maxConcurrency must be in [1, 4x cpu]: got {}",
            config.max_concurrency
        )));
    }
    for pattern in std::iter::once(&config.filename_patterns.primary_pattern)
        .chain(config.filename_patterns.fallback_patterns.iter())
    {
        if pattern.is_empty() {
            continue;
        }
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(Error::InvalidInput(format!("invalid filename pattern '{pattern}': {e}")));
        }
    }
    Ok(())
}

struct State {
    current: Option<Configuration>,
    last_mtime: Option<SystemTime>,
    highest_observed: HashMap<SubtitleSourceFormat, f64>,
}

/// Loads, validates, and hot-reloads the matching configuration, enforcing
/// the stability policy on every threshold change.
///
/// Readers obtain a stable, immutable snapshot via [`ConfigurationEngine::current`];
/// the background poller ([`ConfigurationEngine::spawn_poller`]) only ever
/// updates the observed-threshold bookkeeping, never the active snapshot,
/// per §9's "shared mutable configuration" design note.
pub struct ConfigurationEngine {
    path: PathBuf,
    state: RwLock<State>,
}

impl ConfigurationEngine {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(State {
                current: None,
                last_mtime: None,
                highest_observed: HashMap::new(),
            }),
        }
    }

    fn read_file_and_mtime(&self) -> Result<(String, SystemTime)> {
        let text = std::fs::read_to_string(&self.path)?;
        let mtime = std::fs::metadata(&self.path)?.modified()?;
        Ok((text, mtime))
    }

    /// Parse `text`, applying §4.4's split `maxConcurrency` policy: a
    /// lenient parse always defaults an out-of-range value to 1; a strict
    /// parse defaults it to 1 only when `is_initial` (no prior successful
    /// load exists yet) — on a reload after a prior success, the
    /// out-of-range value is left as-is so [`validate`] rejects it instead.
    fn parse(text: &str, is_initial: bool) -> Result<Configuration> {
        match parse_strict(text) {
            Ok(mut config) => {
                if is_initial && !(1..=100).contains(&config.max_concurrency) {
                    config.max_concurrency = 1;
                }
                Ok(config)
            }
            Err(strict_err) => {
                warn!(error = %strict_err, "strict config parse failed, falling back to lenient parser");
                parse_lenient(text)
            }
        }
    }

    /// Apply the stability policy to every format present in `candidate`,
    /// using `previous` (if any) and this engine's running
    /// `highest_observed` bookkeeping, then validate the result.
    fn stabilize_and_validate(&self, mut candidate: Configuration) -> Result<Configuration> {
        let mut state = self.state.write();
        for (format, thresholds) in candidate.thresholds.clone() {
            let previous = state
                .current
                .as_ref()
                .and_then(|c| c.thresholds.get(&format))
                .copied();
            let highest = state.highest_observed.get(&format).copied().unwrap_or(0.0);
            let (adjusted, new_highest) = stability::apply(previous, thresholds, highest);
            candidate.thresholds.insert(format, adjusted);
            state.highest_observed.insert(format, new_highest);
        }
        drop(state);
        validate(&candidate)?;
        Ok(candidate)
    }

    /// Read the config file, parse it (strict, then lenient on failure),
    /// apply the stability policy, validate, and store the result as the
    /// active snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read, neither parser can make
    /// sense of it, or the stabilized result fails validation.
    pub fn load(&self) -> Result<Configuration> {
        let (text, mtime) = self.read_file_and_mtime()?;
        let is_initial = self.state.read().current.is_none();
        let parsed = Self::parse(&text, is_initial)?;
        let config = self.stabilize_and_validate(parsed)?;
        // Operator overrides are applied after validation/stability and are
        // never themselves subject to either, per §4.4's ambient supplement.
        let config = env::apply_overrides(config);

        let mut state = self.state.write();
        state.current = Some(config.clone());
        state.last_mtime = Some(mtime);
        info!(version = %config.version, strategy = ?config.matching_strategy, "configuration loaded");
        Ok(config)
    }

    /// Compare the file's last-write timestamp to the stored one; reload
    /// only on increase.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigurationEngine::load`]'s errors when a reload is
    /// triggered.
    pub fn reload_if_changed(&self) -> Result<Option<Configuration>> {
        let on_disk_mtime = std::fs::metadata(&self.path)?.modified()?;
        let should_reload = {
            let state = self.state.read();
            state.last_mtime.is_none_or(|stored| on_disk_mtime > stored)
        };
        if should_reload {
            Ok(Some(self.load()?))
        } else {
            Ok(None)
        }
    }

    /// The currently active, validated configuration snapshot, if loaded.
    #[must_use]
    pub fn current(&self) -> Option<Configuration> {
        self.state.read().current.clone()
    }

    /// Highest `matchConfidence` ever observed for `format`, whether via an
    /// explicit load or the background poller.
    #[must_use]
    pub fn highest_observed(&self, format: SubtitleSourceFormat) -> f64 {
        self.state.read().highest_observed.get(&format).copied().unwrap_or(0.0)
    }

    /// Spawn a background task that polls the config file's mtime every
    /// `poll_interval` and, on any change, parses it (without requiring a
    /// successful validation) purely to update `highest_observed` — never
    /// the active snapshot. Intended to run for the process lifetime;
    /// aborts cleanly when the returned handle is dropped... actually kept
    /// alive by the caller.
    #[must_use]
    pub fn spawn_poller(self: Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            let mut last_seen_mtime = self.state.read().last_mtime;
            loop {
                ticker.tick().await;
                let Ok(metadata) = std::fs::metadata(&self.path) else { continue };
                let Ok(mtime) = metadata.modified() else { continue };
                if last_seen_mtime.is_some_and(|last| mtime <= last) {
                    continue;
                }
                last_seen_mtime = Some(mtime);

                let Ok(text) = std::fs::read_to_string(&self.path) else { continue };
                // max_concurrency is discarded below; this poller only ever
                // updates highest_observed, so the initial-load clamp policy
                // doesn't apply here.
                let Ok(parsed) = Self::parse(&text, false) else { continue };

                let mut state = self.state.write();
                for (format, thresholds) in &parsed.thresholds {
                    let entry = state.highest_observed.entry(*format).or_insert(0.0);
                    *entry = entry.max(thresholds.match_confidence);
                }
            }
        })
    }
}
