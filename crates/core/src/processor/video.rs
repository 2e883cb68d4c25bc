//! Video processors that shell out to ffmpeg.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{source_mime, target_mime, FfmpegRunner, Processor, ProcessorError, ProcessorKind};
use crate::artifact::Artifact;
use crate::catalog::{Derivation, VariationDefinition};

fn is_video(mime: &str) -> bool {
    mime.starts_with("video/")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Grabs a single frame from a video as a still image.
pub struct VideoScreenshotProcessor {
    runner: Arc<FfmpegRunner>,
}

impl VideoScreenshotProcessor {
    pub const NAME: &'static str = "video-screenshot";

    pub fn new(runner: Arc<FfmpegRunner>) -> Self {
        Self { runner }
    }

    fn build_args(&self, src: &Path, dest: &Path, at_secs: f64) -> Vec<String> {
        let mut args = self.runner.global_args();
        args.extend([
            "-ss".to_string(),
            format!("{:.3}", at_secs.max(0.0)),
            "-i".to_string(),
            path_arg(src),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
        ]);
        self.runner.finish_args(args, dest)
    }
}

#[async_trait]
impl Processor for VideoScreenshotProcessor {
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
        is_video(source_mime(artifact, src))
            && dest.mime_type.starts_with("image/")
            && matches!(dest.derivation, Derivation::Screenshot { .. })
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
        let Derivation::Screenshot { at_secs } = variation.derivation else {
            return Err(ProcessorError::UnsupportedDerivation {
                processor: Self::NAME.to_string(),
                derivation: variation.derivation.label().to_string(),
            });
        };
        self.runner.run(&self.build_args(src, dest, at_secs)).await
    }
}

/// Re-encodes a video to H.264 MP4 bounded by the variation's dimensions.
pub struct VideoTranscodeProcessor {
    runner: Arc<FfmpegRunner>,
}

impl VideoTranscodeProcessor {
    pub const NAME: &'static str = "video-transcode";

    pub fn new(runner: Arc<FfmpegRunner>) -> Self {
        Self { runner }
    }

    fn build_args(&self, src: &Path, dest: &Path, max_width: u32, max_height: u32) -> Vec<String> {
        // Scale down only, then round to even dimensions as libx264 requires.
        let filter = format!(
            "scale=w='min({},iw)':h='min({},ih)':force_original_aspect_ratio=decrease,scale=trunc(iw/2)*2:trunc(ih/2)*2",
            max_width, max_height
        );
        let mut args = self.runner.global_args();
        args.extend([
            "-i".to_string(),
            path_arg(src),
            "-vf".to_string(),
            filter,
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            "23".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-an".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
        self.runner.finish_args(args, dest)
    }
}

#[async_trait]
impl Processor for VideoTranscodeProcessor {
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
        is_video(source_mime(artifact, src))
            && is_video(&dest.mime_type)
            && matches!(dest.derivation, Derivation::Transcode { .. })
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
        let Derivation::Transcode {
            max_width,
            max_height,
        } = variation.derivation
        else {
            return Err(ProcessorError::UnsupportedDerivation {
                processor: Self::NAME.to_string(),
                derivation: variation.derivation.label().to_string(),
            });
        };
        self.runner
            .run(&self.build_args(src, dest, max_width, max_height))
            .await
    }
}

/// Moves the MP4 index to the front so playback can start before the
/// download finishes. Streams are copied, not re-encoded.
pub struct VideoOptimizationProcessor {
    runner: Arc<FfmpegRunner>,
}

impl VideoOptimizationProcessor {
    pub const NAME: &'static str = "video-optimization";

    pub fn new(runner: Arc<FfmpegRunner>) -> Self {
        Self { runner }
    }

    fn build_args(&self, src: &Path, dest: &Path) -> Vec<String> {
        let mut args = self.runner.global_args();
        args.extend([
            "-i".to_string(),
            path_arg(src),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
        self.runner.finish_args(args, dest)
    }
}

#[async_trait]
impl Processor for VideoOptimizationProcessor {
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
        target_mime(artifact, src, dest).eq_ignore_ascii_case("video/mp4")
    }

    async fn process(
        &self,
        _artifact: &Artifact,
        src: &Path,
        dest: &Path,
        _variation: Option<&VariationDefinition>,
    ) -> Result<(), ProcessorError> {
        self.runner.run(&self.build_args(src, dest)).await
    }
}
