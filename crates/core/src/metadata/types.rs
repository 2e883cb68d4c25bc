//! Extracted metadata types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageMetadata {
    /// Decoder format name ("png", "jpeg", ...).
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoMetadata {
    pub format: String,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    pub bytes: u64,
}

/// Fallback for formats without a structural reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Image(ImageMetadata),
    Video(VideoMetadata),
    File(FileMetadata),
}

impl Metadata {
    pub fn bytes(&self) -> u64 {
        match self {
            Metadata::Image(m) => m.bytes,
            Metadata::Video(m) => m.bytes,
            Metadata::File(m) => m.bytes,
        }
    }

    /// Everything the reader found.
    pub fn detailed(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Just enough for listing a variation: dimensions and duration.
    pub fn variation_view(&self) -> Value {
        match self {
            Metadata::Image(m) => json!({ "width": m.width, "height": m.height }),
            Metadata::Video(m) => json!({
                "width": m.width,
                "height": m.height,
                "duration_secs": m.duration_secs,
            }),
            Metadata::File(m) => json!({ "sha256": m.sha256 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views() {
        let m = Metadata::Image(ImageMetadata {
            format: "png".to_string(),
            width: 640,
            height: 480,
            bytes: 1234,
        });
        let detailed = m.detailed();
        assert_eq!(detailed["kind"], "image");
        assert_eq!(detailed["format"], "png");
        assert_eq!(detailed["bytes"], 1234);
        assert_eq!(m.variation_view(), json!({"width": 640, "height": 480}));
        assert_eq!(m.bytes(), 1234);
    }

    #[test]
    fn test_video_view_skips_codecs() {
        let m = Metadata::Video(VideoMetadata {
            format: "mov".to_string(),
            duration_secs: 12.5,
            width: 1080,
            height: 1920,
            fps: Some(30.0),
            video_codec: Some("h264".to_string()),
            audio_codec: None,
            bit_rate: None,
            bytes: 99,
        });
        let view = m.variation_view();
        assert_eq!(view["duration_secs"], 12.5);
        assert!(view.get("video_codec").is_none());
        assert!(m.detailed().get("audio_codec").is_none());
    }
}
