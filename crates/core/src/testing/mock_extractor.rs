//! Mock metadata extractor for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metadata::{ImageMetadata, Metadata, MetadataError, MetadataExtractor};

/// Mock implementation of the MetadataExtractor trait.
///
/// Supports every MIME type and reports a fixed 100x100 image with the
/// file's real size.
#[derive(Debug, Clone)]
pub struct MockExtractor {
    /// Paths extraction was requested for.
    calls: Arc<RwLock<Vec<PathBuf>>>,
    /// If set, the next extraction fails with this reason.
    next_error: Arc<RwLock<Option<String>>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn fail_next(&self, reason: impl Into<String>) {
        *self.next_error.write().await = Some(reason.into());
    }

    pub async fn recorded_paths(&self) -> Vec<PathBuf> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl MetadataExtractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, _mime_type: &str) -> bool {
        true
    }

    async fn extract(&self, path: &Path, _mime_type: &str) -> Result<Metadata, MetadataError> {
        self.calls.write().await.push(path.to_path_buf());
        if let Some(reason) = self.next_error.write().await.take() {
            return Err(MetadataError::invalid(reason));
        }
        let bytes = tokio::fs::metadata(path).await?.len();
        Ok(Metadata::Image(ImageMetadata {
            format: "mock".to_string(),
            width: 100,
            height: 100,
            bytes,
        }))
    }
}
