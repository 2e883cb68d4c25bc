//! Metadata extractor trait definition.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use super::{Metadata, MetadataError};

/// A format-specific metadata reader.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this reader understands files of `mime_type`.
    fn supports(&self, mime_type: &str) -> bool;

    async fn extract(&self, path: &Path, mime_type: &str) -> Result<Metadata, MetadataError>;

    /// Serialized view stored for originals.
    fn detailed(&self, metadata: &Metadata) -> Value {
        metadata.detailed()
    }

    /// Serialized view stored for variations.
    fn variation_view(&self, metadata: &Metadata) -> Value {
        metadata.variation_view()
    }
}
