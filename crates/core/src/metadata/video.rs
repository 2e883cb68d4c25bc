//! Video metadata via ffprobe.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{Metadata, MetadataError, MetadataExtractor, VideoMetadata};
use crate::processor::{FfmpegRunner, MediaInfo};

pub struct VideoMetadataReader {
    runner: Arc<FfmpegRunner>,
}

impl VideoMetadataReader {
    pub fn new(runner: Arc<FfmpegRunner>) -> Self {
        Self { runner }
    }
}

pub(super) fn from_media_info(info: MediaInfo, bytes: u64) -> Result<VideoMetadata, MetadataError> {
    let (Some(width), Some(height)) = (info.width, info.height) else {
        return Err(MetadataError::invalid("no video stream"));
    };
    Ok(VideoMetadata {
        format: info.format,
        duration_secs: info.duration_secs,
        width,
        height,
        fps: info.fps,
        video_codec: info.video_codec,
        audio_codec: info.audio_codec,
        bit_rate: info.bit_rate,
        bytes,
    })
}

#[async_trait]
impl MetadataExtractor for VideoMetadataReader {
    fn name(&self) -> &str {
        "video"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type.starts_with("video/")
    }

    async fn extract(&self, path: &Path, _mime_type: &str) -> Result<Metadata, MetadataError> {
        let bytes = tokio::fs::metadata(path).await?.len();
        let info = self.runner.probe(path).await?;
        Ok(Metadata::Video(from_media_info(info, bytes)?))
    }
}
