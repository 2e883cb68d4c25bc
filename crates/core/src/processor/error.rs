//! Error types for processors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while selecting or running a processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output MIME type cannot be written by this processor.
    #[error("Unsupported output type: {mime}")]
    UnsupportedOutput { mime: String },

    /// The variation asks for a derivation this processor does not implement.
    #[error("Processor {processor} cannot apply derivation '{derivation}'")]
    UnsupportedDerivation {
        processor: String,
        derivation: String,
    },

    /// A creation processor was run without a destination variation.
    #[error("Processor {processor} requires a destination variation")]
    MissingVariation { processor: String },

    /// External tool or codec failed.
    #[error("Processing failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    /// Processor finished without writing anything.
    #[error("Processor produced no output at {path}")]
    EmptyOutput { path: PathBuf },

    /// External tool timed out and was killed.
    #[error("Processing timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Failed to parse FFprobe output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },

    /// Image decoding or encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error during processing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was cancelled.
    #[error("Processing task failed: {0}")]
    TaskJoin(String),

    /// More than one creation processor accepts the same job.
    #[error("Ambiguous processors for artifact {artifact_id} ({src} -> {dest}): {}", .processors.join(", "))]
    Ambiguous {
        artifact_id: String,
        src: String,
        dest: String,
        processors: Vec<String>,
    },

    /// A job names a processor that is not registered.
    #[error("Unknown processor: {0}")]
    UnknownProcessor(String),

    /// Two processors registered under the same name.
    #[error("Processor already registered: {0}")]
    DuplicateProcessor(String),
}

impl ProcessorError {
    /// Creates a new processing failed error with stderr output.
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }

    /// Whether this error points at a broken processor set rather than a bad input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Ambiguous { .. } | Self::UnknownProcessor(_) | Self::DuplicateProcessor(_)
        )
    }
}

impl From<tokio::task::JoinError> for ProcessorError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskJoin(e.to_string())
    }
}
