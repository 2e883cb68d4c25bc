//! Shared processor types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Optimization jobs on a variation run after the creation work of the same
/// priority band.
pub const OPTIMIZATION_PRIORITY_OFFSET: i32 = 100;

/// What a processor does with its input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Produces a new variation from a source.
    Creation,
    /// Rewrites an existing file in place.
    Optimization,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Creation => "creation",
            ProcessorKind::Optimization => "optimization",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creation" => Ok(ProcessorKind::Creation),
            "optimization" => Ok(ProcessorKind::Optimization),
            other => Err(format!("unknown processor kind: {}", other)),
        }
    }
}

/// Information about a media file, as reported by ffprobe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
    /// Container format (first entry of ffprobe's format list).
    pub format: String,
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub bit_rate: Option<u64>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f32>,
    pub audio_codec: Option<String>,
}
