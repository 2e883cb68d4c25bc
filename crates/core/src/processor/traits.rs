//! Processor trait definition.

use async_trait::async_trait;
use std::path::Path;

use super::{ProcessorError, ProcessorKind, OPTIMIZATION_PRIORITY_OFFSET};
use crate::artifact::Artifact;
use crate::catalog::VariationDefinition;
use crate::queue::Stage;

/// A unit of work that turns a source file into a destination file.
///
/// Implementations must only write to `dest`; the worker owns publishing.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Unique name, persisted on queued jobs.
    fn name(&self) -> &str;

    fn kind(&self) -> ProcessorKind;

    /// Whether this processor handles the given (artifact, source, destination).
    ///
    /// `src` is `None` when the source is the original. Optimization
    /// processors are asked with the same variation on both sides.
    fn can_process(
        &self,
        artifact: &Artifact,
        src: Option<&VariationDefinition>,
        dest: Option<&VariationDefinition>,
    ) -> bool;

    /// Queue priority for a job producing `variation` (`None` = the original).
    fn priority(&self, variation: Option<&VariationDefinition>) -> i32 {
        let base = variation.map(|v| v.priority).unwrap_or(0);
        match self.kind() {
            ProcessorKind::Creation => base,
            ProcessorKind::Optimization => base + OPTIMIZATION_PRIORITY_OFFSET,
        }
    }

    /// Which stage of queues this processor's jobs go to.
    fn queue_class(&self) -> Stage {
        match self.kind() {
            ProcessorKind::Creation => Stage::Creation,
            ProcessorKind::Optimization => Stage::Optimization,
        }
    }

    /// Read `src`, write the result to `dest`.
    async fn process(
        &self,
        artifact: &Artifact,
        src: &Path,
        dest: &Path,
        variation: Option<&VariationDefinition>,
    ) -> Result<(), ProcessorError>;
}

/// MIME type of the file a job reads.
pub fn source_mime<'a>(artifact: &'a Artifact, src: Option<&'a VariationDefinition>) -> &'a str {
    src.map(|v| v.mime_type.as_str())
        .unwrap_or(artifact.mime_type.as_str())
}

/// MIME type of the file a job produces or rewrites.
pub fn target_mime<'a>(
    artifact: &'a Artifact,
    src: Option<&'a VariationDefinition>,
    dest: Option<&'a VariationDefinition>,
) -> &'a str {
    dest.or(src)
        .map(|v| v.mime_type.as_str())
        .unwrap_or(artifact.mime_type.as_str())
}
