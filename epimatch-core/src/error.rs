//! Error taxonomy for the episode identification engine.
//!
//! Two taxonomies are modeled: request/system-level [`Error`] (used by the
//! configuration engine, index store, and public API surface) and the
//! per-file [`BulkErrorKind`] used by the bulk orchestrator to classify
//! failures and decide retry eligibility.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the identification engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("File access error: {0}")]
    FileAccessError(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Processing timed out")]
    ProcessingTimeout,

    #[error("System error: {0}")]
    SystemError(String),

    #[error("Operation cancelled")]
    OperationCancelled,

    #[error("Identification failed: {0}")]
    IdentificationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] anyhow::Error),
}

impl Error {
    /// Whether retrying this operation could plausibly succeed.
    ///
    /// Mirrors the retryable subset of [`BulkErrorKind`]: `FileAccessError`,
    /// `ProcessingError`, and `ProcessingTimeout` are the only retryable
    /// per-file kinds; everything else is either a validation problem or
    /// permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FileAccessError(_)
                | Error::ProcessingError(_)
                | Error::ProcessingTimeout
                | Error::Storage(_)
                | Error::Io(_)
        )
    }

    /// The stable, caller-facing code for identification-layer failures.
    ///
    /// These codes are the ones named explicitly in the identification
    /// engine's error conditions (`IDENTIFICATION_FAILED`,
    /// `CONFIGURATION_ERROR`) plus the two bulk-mode "non-fatal" codes
    /// (`UNSUPPORTED_FILE_TYPE`, `NO_SUBTITLES_FOUND`) that the orchestrator
    /// treats as per-file non-errors.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::IdentificationFailed(_) => "IDENTIFICATION_FAILED",
            Error::ConfigurationError(_) => "CONFIGURATION_ERROR",
            Error::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            Error::InvalidFileFormat(_) => "INVALID_FILE_FORMAT",
            Error::FileNotFound(_) => "FILE_NOT_FOUND",
            Error::AccessDenied(_) => "ACCESS_DENIED",
            Error::FileAccessError(_) => "FILE_ACCESS_ERROR",
            Error::ProcessingError(_) => "PROCESSING_ERROR",
            Error::ProcessingTimeout => "PROCESSING_TIMEOUT",
            Error::SystemError(_) => "SYSTEM_ERROR",
            Error::OperationCancelled => "OPERATION_CANCELLED",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Embedding(_) => "EMBEDDING_ERROR",
        }
    }
}

/// A distinct error raised when no subtitle track could be found, as opposed
/// to extraction failing outright. Not an [`Error`] variant because callers
/// that see this are expected to treat it as a per-file non-error in bulk
/// mode rather than a processing failure.
#[derive(Debug, thiserror::Error)]
#[error("No subtitles found")]
pub struct NoSubtitlesFound;

/// Per-file error classification used by the bulk orchestrator.
///
/// Distinct from [`Error`] because the orchestrator's retry and abort
/// decisions hinge on the *kind* of failure, not its message, and a kind
/// must be derivable from whatever the video-processing collaborator
/// throws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BulkErrorKind {
    InvalidInput,
    FileNotFound,
    AccessDenied,
    FileAccessError,
    UnsupportedFileType,
    InvalidFileFormat,
    ProcessingError,
    ProcessingTimeout,
    SystemError,
    OperationCancelled,
}

impl BulkErrorKind {
    /// Retryable kinds per §7: `FileAccessError`, `ProcessingError`,
    /// `ProcessingTimeout`. Everything else fails immediately.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            BulkErrorKind::FileAccessError
                | BulkErrorKind::ProcessingError
                | BulkErrorKind::ProcessingTimeout
        )
    }

    /// Whether this kind is scoped to a single file (vs. fatal to the run).
    #[must_use]
    pub fn is_per_file(self) -> bool {
        !matches!(self, BulkErrorKind::InvalidInput)
    }
}

impl From<&Error> for BulkErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidInput(_) => BulkErrorKind::InvalidInput,
            Error::FileNotFound(_) => BulkErrorKind::FileNotFound,
            Error::AccessDenied(_) => BulkErrorKind::AccessDenied,
            Error::FileAccessError(_) | Error::Io(_) | Error::Storage(_) => {
                BulkErrorKind::FileAccessError
            }
            Error::UnsupportedFileType(_) => BulkErrorKind::UnsupportedFileType,
            Error::InvalidFileFormat(_) => BulkErrorKind::InvalidFileFormat,
            Error::ProcessingError(_) | Error::IdentificationFailed(_) | Error::Embedding(_) => {
                BulkErrorKind::ProcessingError
            }
            Error::ProcessingTimeout => BulkErrorKind::ProcessingTimeout,
            Error::SystemError(_) => BulkErrorKind::SystemError,
            Error::OperationCancelled => BulkErrorKind::OperationCancelled,
            Error::ConfigurationError(_) | Error::Serialization(_) => BulkErrorKind::SystemError,
        }
    }
}
