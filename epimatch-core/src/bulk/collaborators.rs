//! External collaborator contracts for the bulk pipeline (§6): subtitle
//! extraction and filesystem rename. Both are implemented outside this
//! crate (external media tooling, OS-level rename with sanitization); this
//! module only defines the seams and the deterministic test doubles.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SubtitleSourceFormat;

/// Raw subtitle text pulled from one track of a video file.
#[derive(Debug, Clone)]
pub struct ExtractedSubtitle {
    pub raw_text: String,
    pub source_format: SubtitleSourceFormat,
}

/// Given `(path, trackIndex?, language?)`, returns raw subtitle text for one
/// of three source types (Text, PGS via OCR, VobSub via OCR).
///
/// Returns `Ok(None)` when no suitable track exists (the caller treats this
/// as the non-fatal `NO_SUBTITLES_FOUND` outcome, not a processing error).
/// Tool-missing conditions are signalled via `Err` distinctly from a
/// not-found track, per §6.
#[async_trait]
pub trait SubtitleExtractor: Send + Sync {
    async fn extract(
        &self,
        path: &Path,
        track_index: Option<u32>,
        language: Option<&str>,
    ) -> Result<Option<ExtractedSubtitle>>;
}

/// Outcome of one rename attempt. No side effects outside the parent
/// directory.
#[derive(Debug, Clone)]
pub enum RenameOutcome {
    Success { new_path: PathBuf },
    Failure { error_kind: String, message: String },
}

#[async_trait]
pub trait RenameActor: Send + Sync {
    async fn rename(&self, original_path: &Path, suggested_name: &str) -> RenameOutcome;
}

/// Deterministic test doubles, compiled for this crate's own tests and, via
/// the `test-support` feature, for other workspace crates' dev-dependencies.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::{ExtractedSubtitle, RenameActor, RenameOutcome, SubtitleExtractor};
    use crate::error::{Error, Result};
    use crate::types::SubtitleSourceFormat;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// Hands back canned subtitle text keyed by path, or `Ok(None)` for
    /// unregistered paths — mirroring "no suitable track" rather than
    /// failing.
    #[derive(Debug, Default)]
    pub struct StaticSubtitleExtractor {
        fixtures: HashMap<PathBuf, ExtractedSubtitle>,
        fail_on: Vec<PathBuf>,
        delay: Option<std::time::Duration>,
    }

    impl StaticSubtitleExtractor {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn with_text(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
            self.fixtures.insert(
                path.into(),
                ExtractedSubtitle {
                    raw_text: text.into(),
                    source_format: SubtitleSourceFormat::Text,
                },
            );
            self
        }

        #[must_use]
        pub fn failing_on(mut self, path: impl Into<PathBuf>) -> Self {
            self.fail_on.push(path.into());
            self
        }

        /// Artificially slow this extractor down, for exercising
        /// cancellation mid-run in tests.
        #[must_use]
        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl SubtitleExtractor for StaticSubtitleExtractor {
        async fn extract(
            &self,
            path: &Path,
            _track_index: Option<u32>,
            _language: Option<&str>,
        ) -> Result<Option<ExtractedSubtitle>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on.iter().any(|p| p == path) {
                return Err(Error::ProcessingError("extraction failed".to_string()));
            }
            // No fixture registered: mirrors a missing subtitle track
            // (`NoSubtitlesFound`), not an extraction failure.
            Ok(self.fixtures.get(path).cloned())
        }
    }

    /// Always reports success, returning the parent directory joined with
    /// `suggested_name`. Never touches the filesystem.
    #[derive(Debug, Default)]
    pub struct NoopRenameActor;

    #[async_trait]
    impl RenameActor for NoopRenameActor {
        async fn rename(&self, original_path: &Path, suggested_name: &str) -> RenameOutcome {
            let new_path = original_path
                .parent()
                .map_or_else(|| PathBuf::from(suggested_name), |p| p.join(suggested_name));
            RenameOutcome::Success { new_path }
        }
    }
}
