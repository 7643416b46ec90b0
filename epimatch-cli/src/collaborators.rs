//! Concrete implementations of `epimatch_core`'s external collaborator
//! traits (§6): an embedding provider and subtitle extractor that shell out
//! to external tools, and a filesystem rename actor. None of these belong
//! in `epimatch-core` itself — the ONNX runtime and media tooling are out
//! of scope for the engine crate, so the binary supplies them.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use epimatch_core::bulk::{ExtractedSubtitle, RenameActor, RenameOutcome, SubtitleExtractor};
use epimatch_core::embeddings::EmbeddingProvider;
use epimatch_core::error::{Error, Result};
use epimatch_core::types::{Embedding, SubtitleSourceFormat, EMBEDDING_DIM};

/// Generates embeddings by invoking an external ONNX inference helper
/// process once per call, writing the input text to its stdin and parsing
/// a newline-delimited list of floats from stdout.
///
/// The helper binary is external to this repo (it owns model loading and
/// the ONNX runtime itself); this struct only knows how to talk to it.
pub struct SubprocessEmbeddingProvider {
    binary: PathBuf,
}

impl SubprocessEmbeddingProvider {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl EmbeddingProvider for SubprocessEmbeddingProvider {
    async fn generate(&self, text: &str) -> Result<Embedding> {
        let mut child = Command::new(&self.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::IdentificationFailed(format!("failed to spawn embedding helper: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::IdentificationFailed("embedding helper has no stdin".into()))?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::IdentificationFailed(format!("failed to write to embedding helper: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::IdentificationFailed(format!("embedding helper failed: {e}")))?;
        if !output.status.success() {
            return Err(Error::IdentificationFailed(format!(
                "embedding helper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| Error::IdentificationFailed(format!("embedding helper wrote non-utf8 output: {e}")))?;
        let values: std::result::Result<Vec<f32>, _> =
            text.split_whitespace().map(str::parse::<f32>).collect();
        let values = values
            .map_err(|e| Error::IdentificationFailed(format!("embedding helper wrote non-numeric output: {e}")))?;

        if values.len() != EMBEDDING_DIM {
            return Err(Error::IdentificationFailed(format!(
                "embedding helper returned {} values, expected {EMBEDDING_DIM}",
                values.len()
            )));
        }
        Embedding::new(values).map_err(|e| Error::IdentificationFailed(e.to_string()))
    }
}

/// Extracts subtitle text by invoking an external demuxing/OCR tool and
/// reading its stdout. `track_index`/`language` are passed through as CLI
/// flags when present.
pub struct SubprocessSubtitleExtractor {
    binary: PathBuf,
}

impl SubprocessSubtitleExtractor {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl SubtitleExtractor for SubprocessSubtitleExtractor {
    async fn extract(
        &self,
        path: &Path,
        track_index: Option<u32>,
        language: Option<&str>,
    ) -> Result<Option<ExtractedSubtitle>> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(path);
        if let Some(track) = track_index {
            cmd.arg("--track").arg(track.to_string());
        }
        if let Some(lang) = language {
            cmd.arg("--language").arg(lang);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::ProcessingError(format!("failed to spawn subtitle extractor: {e}")))?;

        // Exit code 2 is this tool's convention for "no subtitle track
        // found", distinct from a hard failure.
        if output.status.code() == Some(2) {
            debug!(path = %path.display(), "subtitle extractor reported no suitable track");
            return Ok(None);
        }
        if !output.status.success() {
            return Err(Error::ProcessingError(format!(
                "subtitle extractor exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let raw_text = String::from_utf8_lossy(&output.stdout).into_owned();
        if raw_text.trim().is_empty() {
            return Ok(None);
        }
        let source_format = classify_extension(path);
        Ok(Some(ExtractedSubtitle { raw_text, source_format }))
    }
}

fn classify_extension(path: &Path) -> SubtitleSourceFormat {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("sup") => SubtitleSourceFormat::Pgs,
        Some("sub") | Some("idx") => SubtitleSourceFormat::VobSub,
        _ => SubtitleSourceFormat::Text,
    }
}

/// Computes the rename target without touching the filesystem, for
/// `--dry-run` bulk runs.
#[derive(Debug, Default)]
pub struct DryRunRenameActor;

#[async_trait]
impl RenameActor for DryRunRenameActor {
    async fn rename(&self, original_path: &Path, suggested_name: &str) -> RenameOutcome {
        match sanitize_filename(suggested_name) {
            Ok(sanitized) => {
                let new_path = original_path
                    .parent()
                    .map_or_else(|| PathBuf::from(&sanitized), |p| p.join(&sanitized));
                RenameOutcome::Success { new_path }
            }
            Err(message) => RenameOutcome::Failure { error_kind: "invalid_name".to_string(), message },
        }
    }
}

/// Renames a file within its own parent directory, refusing any suggested
/// name that would escape it (path traversal via `..` or an absolute path
/// embedded in the suggestion).
#[derive(Debug, Default)]
pub struct FilesystemRenameActor;

#[async_trait]
impl RenameActor for FilesystemRenameActor {
    async fn rename(&self, original_path: &Path, suggested_name: &str) -> RenameOutcome {
        let sanitized = match sanitize_filename(suggested_name) {
            Ok(name) => name,
            Err(message) => {
                return RenameOutcome::Failure { error_kind: "invalid_name".to_string(), message };
            }
        };

        let Some(parent) = original_path.parent() else {
            return RenameOutcome::Failure {
                error_kind: "no_parent_directory".to_string(),
                message: format!("{} has no parent directory", original_path.display()),
            };
        };
        let new_path = parent.join(&sanitized);

        match tokio::fs::rename(original_path, &new_path).await {
            Ok(()) => RenameOutcome::Success { new_path },
            Err(e) => {
                warn!(original = %original_path.display(), target = %new_path.display(), error = %e, "rename failed");
                RenameOutcome::Failure { error_kind: "io_error".to_string(), message: e.to_string() }
            }
        }
    }
}

/// Rejects any component that would let a suggested filename climb out of
/// its parent directory.
fn sanitize_filename(suggested: &str) -> std::result::Result<String, String> {
    let candidate = Path::new(suggested);
    if candidate.is_absolute() {
        return Err(format!("suggested name '{suggested}' must be relative"));
    }
    if candidate.components().count() != 1 {
        return Err(format!("suggested name '{suggested}' must not contain path separators"));
    }
    if matches!(
        candidate.components().next(),
        Some(std::path::Component::ParentDir | std::path::Component::CurDir)
    ) {
        return Err(format!("suggested name '{suggested}' must not reference '.' or '..'"));
    }
    Ok(suggested.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize_filename("../escape.mkv").is_err());
        assert!(sanitize_filename("/abs/path.mkv").is_err());
        assert!(sanitize_filename("sub/dir.mkv").is_err());
    }

    #[test]
    fn sanitize_accepts_plain_name() {
        assert_eq!(sanitize_filename("Show S01E02.mkv").unwrap(), "Show S01E02.mkv");
    }

    #[tokio::test]
    async fn filesystem_rename_actor_renames_within_parent() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.mkv");
        tokio::fs::write(&original, b"data").await.unwrap();

        let actor = FilesystemRenameActor;
        let outcome = actor.rename(&original, "Show S01E01.mkv").await;
        match outcome {
            RenameOutcome::Success { new_path } => {
                assert!(new_path.ends_with("Show S01E01.mkv"));
                assert!(new_path.exists());
            }
            RenameOutcome::Failure { message, .. } => panic!("expected success, got: {message}"),
        }
    }

    #[tokio::test]
    async fn filesystem_rename_actor_rejects_traversal_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.mkv");
        tokio::fs::write(&original, b"data").await.unwrap();

        let actor = FilesystemRenameActor;
        let outcome = actor.rename(&original, "../escape.mkv").await;
        assert!(matches!(outcome, RenameOutcome::Failure { .. }));
        assert!(original.exists());
    }
}
