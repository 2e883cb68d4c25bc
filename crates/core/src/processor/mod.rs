//! Pluggable units of work.
//!
//! *Creation* processors derive a new variation from a source file.
//! *Optimization* processors rewrite an existing file (the original or a
//! variation) without changing what it depicts.

mod error;
mod ffmpeg;
mod raster;
mod registry;
mod traits;
mod types;
mod video;

pub use error::ProcessorError;
pub use ffmpeg::{FfmpegConfig, FfmpegRunner};
pub use raster::{ImageOptimizationProcessor, ImageVariationProcessor};
pub use registry::ProcessorRegistry;
pub use traits::{source_mime, target_mime, Processor};
pub use types::{MediaInfo, ProcessorKind, OPTIMIZATION_PRIORITY_OFFSET};
pub use video::{VideoOptimizationProcessor, VideoScreenshotProcessor, VideoTranscodeProcessor};
