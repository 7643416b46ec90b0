//! Streaming filesystem discovery for the bulk pipeline's Discovery phase.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::is_supported_video_extension;
use crate::types::BulkOptions;

/// Walk `roots` (files or directories) and return every video file that
/// passes the extension filters, honoring `options.recursive`,
/// `options.max_depth`, and cooperative cancellation via `cancelled`.
///
/// A bare file path in `roots` is included as-is (its extension is still
/// checked against the filters) rather than treated as a directory. A root
/// that does not exist contributes nothing — the bulk orchestrator is
/// responsible for turning an explicitly requested, missing file into a
/// per-file `FileNotFound` outcome; this function only ever reports what it
/// actually found on disk.
///
/// # Errors
///
/// Returns `Err(Error::OperationCancelled)` if `cancelled` flips mid-walk.
pub fn discover_files(
    roots: &[PathBuf],
    options: &BulkOptions,
    cancelled: &Arc<AtomicBool>,
) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for root in roots {
        if root.is_file() {
            if passes_filters(root, options) {
                found.push(root.clone());
            }
            continue;
        }
        if !root.is_dir() {
            continue;
        }
        walk_dir(root, options, 0, cancelled, &mut found)?;
    }
    found.sort();
    found.dedup();
    debug!(count = found.len(), "discovery complete");
    Ok(found)
}

fn walk_dir(
    dir: &Path,
    options: &BulkOptions,
    depth: usize,
    cancelled: &Arc<AtomicBool>,
    found: &mut Vec<PathBuf>,
) -> Result<()> {
    if cancelled.load(Ordering::SeqCst) {
        return Err(Error::OperationCancelled);
    }
    if let Some(max_depth) = options.max_depth {
        if depth > max_depth {
            return Ok(());
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
            return Ok(());
        }
    };

    for entry in entries {
        if cancelled.load(Ordering::SeqCst) {
            return Err(Error::OperationCancelled);
        }
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_dir() {
            if options.recursive {
                walk_dir(&path, options, depth + 1, cancelled, found)?;
            }
        } else if passes_filters(&path, options) {
            found.push(path);
        }
    }
    Ok(())
}

fn passes_filters(path: &Path, options: &BulkOptions) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext_lower = ext.to_ascii_lowercase();

    if !options.exclude_exts.is_empty()
        && options.exclude_exts.iter().any(|e| e.eq_ignore_ascii_case(&ext_lower))
    {
        return false;
    }

    if !options.include_exts.is_empty() {
        return options.include_exts.iter().any(|e| e.eq_ignore_ascii_case(&ext_lower));
    }

    is_supported_video_extension(&ext_lower)
}
