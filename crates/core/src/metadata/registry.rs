//! Extractor selection by MIME type.

use std::sync::Arc;

use super::{
    BinaryMetadataReader, ImageMetadataReader, MetadataError, MetadataExtractor,
    VideoMetadataReader,
};
use crate::processor::FfmpegRunner;

/// Extractors in priority order; the first one supporting a MIME type wins.
#[derive(Clone, Default)]
pub struct MetadataRegistry {
    extractors: Vec<Arc<dyn MetadataExtractor>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image and video readers, with the checksum reader as fallback.
    pub fn with_defaults(runner: Arc<FfmpegRunner>) -> Self {
        Self {
            extractors: vec![
                Arc::new(ImageMetadataReader::new()),
                Arc::new(VideoMetadataReader::new(runner)),
                Arc::new(BinaryMetadataReader::new()),
            ],
        }
    }

    pub fn register(&mut self, extractor: Arc<dyn MetadataExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn for_mime(&self, mime_type: &str) -> Option<Arc<dyn MetadataExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.supports(mime_type))
            .map(Arc::clone)
    }

    pub fn require(&self, mime_type: &str) -> Result<Arc<dyn MetadataExtractor>, MetadataError> {
        self.for_mime(mime_type)
            .ok_or_else(|| MetadataError::NoExtractor {
                mime: mime_type.to_string(),
            })
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.extractors.iter().map(|e| e.name()).collect();
        f.debug_struct("MetadataRegistry")
            .field("extractors", &names)
            .finish()
    }
}
