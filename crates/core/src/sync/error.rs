use thiserror::Error;

use crate::queue::QueueError;

/// Errors returned to callers waiting for a published file.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The variation is not declared for this artifact.
    #[error("Unknown variation: {variation}")]
    UnknownVariation { variation: String },

    /// The file is missing and no job will produce it.
    #[error("No job pending for {artifact_id}/{variation}")]
    NoSuchJob {
        artifact_id: String,
        variation: String,
    },

    #[error("Timed out after {timeout_secs}s waiting for publish")]
    Timeout { timeout_secs: u64 },

    #[error("Processing failed: {reason}")]
    Failed { reason: String },

    #[error("Artifact was deleted while processing")]
    Cancelled,

    #[error("Completion channel closed")]
    Closed,

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
