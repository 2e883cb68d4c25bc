//! In-process image processors built on the `image` crate.
//!
//! Decoding and encoding are CPU bound, so the work runs on the blocking pool.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

use super::{source_mime, target_mime, Processor, ProcessorError, ProcessorKind};
use crate::artifact::Artifact;
use crate::catalog::{Derivation, Fit, VariationDefinition};

const JPEG_QUALITY: u8 = 85;

fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// Resizes, crops and rotates images into variations.
#[derive(Debug, Default, Clone)]
pub struct ImageVariationProcessor;

impl ImageVariationProcessor {
    pub const NAME: &'static str = "image-variation";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for ImageVariationProcessor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Creation
    }

    fn can_process(
        &self,
        artifact: &Artifact,
        src: Option<&VariationDefinition>,
        dest: Option<&VariationDefinition>,
    ) -> bool {
        let Some(dest) = dest else {
            return false;
        };
        is_image(source_mime(artifact, src))
            && is_image(&dest.mime_type)
            && matches!(
                dest.derivation,
                Derivation::Resize { .. } | Derivation::Square { .. } | Derivation::Rotate { .. }
            )
    }

    async fn process(
        &self,
        _artifact: &Artifact,
        src: &Path,
        dest: &Path,
        variation: Option<&VariationDefinition>,
    ) -> Result<(), ProcessorError> {
        let variation = variation.ok_or_else(|| ProcessorError::MissingVariation {
            processor: Self::NAME.to_string(),
        })?;
        let format = ImageFormat::from_mime_type(&variation.mime_type).ok_or_else(|| {
            ProcessorError::UnsupportedOutput {
                mime: variation.mime_type.clone(),
            }
        })?;

        let derivation = variation.derivation.clone();
        let src = src.to_path_buf();
        let dest = dest.to_path_buf();
        debug!(variation = %variation.name, derivation = derivation.label(), src = %src.display(), "Rendering image variation");

        tokio::task::spawn_blocking(move || render(&src, &dest, &derivation, format)).await?
    }
}

fn render(
    src: &Path,
    dest: &Path,
    derivation: &Derivation,
    format: ImageFormat,
) -> Result<(), ProcessorError> {
    let img = image::open(src)?;

    let out = match *derivation {
        Derivation::Resize { width, height, fit } => fit_into(img, width, height, fit),
        Derivation::Square { size } => img.resize_to_fill(size, size, FilterType::Lanczos3),
        Derivation::Rotate {
            degrees,
            width,
            height,
        } => {
            let rotated = match degrees % 360 {
                0 => img,
                90 => img.rotate90(),
                180 => img.rotate180(),
                270 => img.rotate270(),
                _ => {
                    return Err(ProcessorError::UnsupportedDerivation {
                        processor: ImageVariationProcessor::NAME.to_string(),
                        derivation: format!("rotate {}", degrees),
                    })
                }
            };
            fit_into(rotated, width, height, Fit::Contain)
        }
        _ => {
            return Err(ProcessorError::UnsupportedDerivation {
                processor: ImageVariationProcessor::NAME.to_string(),
                derivation: derivation.label().to_string(),
            })
        }
    };

    encode(&out, dest, format)
}

fn fit_into(img: DynamicImage, width: u32, height: u32, fit: Fit) -> DynamicImage {
    match fit {
        // Never upscale.
        Fit::Contain if img.width() <= width && img.height() <= height => img,
        Fit::Contain => img.resize(width, height, FilterType::Lanczos3),
        Fit::Cover => img.resize_to_fill(width, height, FilterType::Lanczos3),
    }
}

fn encode(img: &DynamicImage, dest: &Path, format: ImageFormat) -> Result<(), ProcessorError> {
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let writer = BufWriter::new(File::create(dest)?);
            rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, JPEG_QUALITY))?;
        }
        ImageFormat::Png => {
            let writer = BufWriter::new(File::create(dest)?);
            img.write_with_encoder(PngEncoder::new(writer))?;
        }
        other => img.save_with_format(dest, other)?,
    }
    Ok(())
}

/// Re-encodes PNGs at the best compression level.
#[derive(Debug, Default, Clone)]
pub struct ImageOptimizationProcessor;

impl ImageOptimizationProcessor {
    pub const NAME: &'static str = "image-optimization";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for ImageOptimizationProcessor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Optimization
    }

    fn can_process(
        &self,
        artifact: &Artifact,
        src: Option<&VariationDefinition>,
        dest: Option<&VariationDefinition>,
    ) -> bool {
        target_mime(artifact, src, dest).eq_ignore_ascii_case("image/png")
    }

    async fn process(
        &self,
        _artifact: &Artifact,
        src: &Path,
        dest: &Path,
        _variation: Option<&VariationDefinition>,
    ) -> Result<(), ProcessorError> {
        let src = src.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || optimize_png(&src, &dest)).await?
    }
}

fn optimize_png(src: &Path, dest: &Path) -> Result<(), ProcessorError> {
    let img = image::open(src)?;
    {
        let writer = BufWriter::new(File::create(dest)?);
        let encoder =
            PngEncoder::new_with_quality(writer, CompressionType::Best, PngFilter::Adaptive);
        img.write_with_encoder(encoder)?;
    }

    // Keep the input when re-encoding does not help.
    let before = std::fs::metadata(src)?.len();
    let after = std::fs::metadata(dest)?.len();
    if after >= before {
        debug!(before, after, "PNG re-encode did not shrink file, keeping input");
        std::fs::copy(src, dest)?;
    }
    Ok(())
}
