//! Metadata extraction for originals and variations.
//!
//! Each extractor produces a typed [`Metadata`] value and two serialized
//! views of it: a detailed one stored on the artifact for its original, and a
//! minimal one stored per variation.

mod binary;
mod error;
mod raster;
mod registry;
mod traits;
mod types;
mod video;

pub use binary::BinaryMetadataReader;
pub use error::MetadataError;
pub use raster::ImageMetadataReader;
pub use registry::MetadataRegistry;
pub use traits::MetadataExtractor;
pub use types::{FileMetadata, ImageMetadata, Metadata, VideoMetadata};
pub use video::VideoMetadataReader;
