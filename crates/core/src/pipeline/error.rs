use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::catalog::CatalogError;
use crate::metadata::MetadataError;
use crate::processor::ProcessorError;
use crate::queue::QueueError;
use crate::sync::SyncError;

/// Any failure surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Misconfiguration rather than a problem with one file.
    pub fn is_configuration(&self) -> bool {
        match self {
            PipelineError::Catalog(_) => true,
            PipelineError::Processor(e) => e.is_configuration(),
            _ => false,
        }
    }
}
