//! Image metadata via the `image` crate's header parsing.

use async_trait::async_trait;
use image::ImageReader;
use std::path::Path;

use super::{ImageMetadata, Metadata, MetadataError, MetadataExtractor};

/// Reads format and dimensions without decoding pixel data.
#[derive(Debug, Default, Clone)]
pub struct ImageMetadataReader;

impl ImageMetadataReader {
    pub fn new() -> Self {
        Self
    }
}

fn read_image(path: &Path) -> Result<ImageMetadata, MetadataError> {
    let bytes = std::fs::metadata(path)?.len();
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .map(|f| format!("{:?}", f).to_ascii_lowercase())
        .ok_or_else(|| MetadataError::invalid("unrecognized image format"))?;
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(MetadataError::invalid("image has zero dimensions"));
    }
    Ok(ImageMetadata {
        format,
        width,
        height,
        bytes,
    })
}

#[async_trait]
impl MetadataExtractor for ImageMetadataReader {
    fn name(&self) -> &str {
        "image"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type.starts_with("image/")
    }

    async fn extract(&self, path: &Path, _mime_type: &str) -> Result<Metadata, MetadataError> {
        let path = path.to_path_buf();
        let meta = tokio::task::spawn_blocking(move || read_image(&path)).await??;
        Ok(Metadata::Image(meta))
    }
}
