//! Error types for metadata extraction.

use thiserror::Error;

use crate::processor::ProcessorError;

#[derive(Debug, Error)]
pub enum MetadataError {
    /// No registered extractor handles this MIME type.
    #[error("No metadata extractor for {mime}")]
    NoExtractor { mime: String },

    /// File could not be decoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// ffprobe failed or returned garbage.
    #[error("Probe failed: {0}")]
    Probe(#[from] ProcessorError),

    /// Decoded fine but the content is unusable.
    #[error("Invalid media: {reason}")]
    Invalid { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Extraction task failed: {0}")]
    TaskJoin(String),
}

impl MetadataError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for MetadataError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskJoin(e.to_string())
    }
}
