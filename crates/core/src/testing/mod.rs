//! Testing utilities and mock implementations.
//!
//! Mocks stand in for real processors and metadata readers so pipeline
//! behaviour can be exercised without ffmpeg or real media files.
//!
//! # Example
//!
//! ```rust,ignore
//! use variations_core::testing::{MockExtractor, MockProcessor};
//!
//! let resize = MockProcessor::creation("resize")
//!     .accepting(|_, _, dest| dest.map_or(false, |v| v.mime_type == "image/jpeg"));
//! resize.fail_next(ProcessorError::failed("boom", None)).await;
//!
//! let extractor = MockExtractor::new();
//! ```

mod mock_extractor;
mod mock_processor;

pub use mock_extractor::MockExtractor;
pub use mock_processor::{MockProcessor, MockProcessorHandle, RecordedProcess};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::artifact::Artifact;
    use crate::catalog::{ArtifactType, Derivation, Fit, VariationDefinition};

    /// An artifact record with a fixed size.
    pub fn artifact(id: &str, artifact_type: ArtifactType, mime_type: &str) -> Artifact {
        Artifact::new(id, artifact_type, mime_type, 1024)
    }

    /// A resize variation derived from the original.
    pub fn resize(name: &str, mime_type: &str, priority: i32, width: u32, height: u32) -> VariationDefinition {
        VariationDefinition::new(
            name,
            mime_type,
            priority,
            Derivation::Resize {
                width,
                height,
                fit: Fit::Contain,
            },
        )
    }

    /// A square crop derived from `source`.
    pub fn square(name: &str, priority: i32, source: &str, size: u32) -> VariationDefinition {
        VariationDefinition::new(name, "image/jpeg", priority, Derivation::Square { size })
            .with_source(source)
    }

    /// Write a solid-colour PNG of the given size.
    pub fn write_png(path: &Path, width: u32, height: u32) -> image::ImageResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90])).save(path)
    }
}
