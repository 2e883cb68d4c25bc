//! Variation catalog data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CatalogError;

// ============================================================================
// Artifact Types
// ============================================================================

/// The kind of artifact an upload represents. Determines, together with the
/// MIME category, which variations are produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Backglass,
    PlayfieldFs,
    PlayfieldWs,
    Logo,
    ReleaseTable,
    Rom,
    Directb2s,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 7] = [
        ArtifactType::Backglass,
        ArtifactType::PlayfieldFs,
        ArtifactType::PlayfieldWs,
        ArtifactType::Logo,
        ArtifactType::ReleaseTable,
        ArtifactType::Rom,
        ArtifactType::Directb2s,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Backglass => "backglass",
            ArtifactType::PlayfieldFs => "playfield-fs",
            ArtifactType::PlayfieldWs => "playfield-ws",
            ArtifactType::Logo => "logo",
            ArtifactType::ReleaseTable => "release-table",
            ArtifactType::Rom => "rom",
            ArtifactType::Directb2s => "directb2s",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownTypeName(s.to_string()))
    }
}

// ============================================================================
// MIME Categories
// ============================================================================

/// Coarse grouping of MIME types. Each category gets its own pair of queues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MimeCategory {
    Image,
    Video,
    Archive,
    Table,
    Other,
}

impl MimeCategory {
    pub const ALL: [MimeCategory; 5] = [
        MimeCategory::Image,
        MimeCategory::Video,
        MimeCategory::Archive,
        MimeCategory::Table,
        MimeCategory::Other,
    ];

    /// Maps a MIME type to its category. Parameters (`; charset=...`) are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.starts_with("image/") {
            return MimeCategory::Image;
        }
        if essence.starts_with("video/") {
            return MimeCategory::Video;
        }

        match essence.as_str() {
            "application/zip"
            | "application/x-zip-compressed"
            | "application/x-rar-compressed"
            | "application/vnd.rar"
            | "application/x-7z-compressed" => MimeCategory::Archive,
            "application/x-visual-pinball-table"
            | "application/x-visual-pinball-table-x"
            | "application/x-directb2s" => MimeCategory::Table,
            _ => MimeCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MimeCategory::Image => "image",
            MimeCategory::Video => "video",
            MimeCategory::Archive => "archive",
            MimeCategory::Table => "table",
            MimeCategory::Other => "other",
        }
    }
}

impl fmt::Display for MimeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownTypeName(s.to_string()))
    }
}

// ============================================================================
// Variation Definitions
// ============================================================================

/// How a resized image fills its target box.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fit {
    /// Scale down to fit entirely inside the box, keeping aspect ratio.
    #[default]
    Contain,
    /// Scale and crop so the box is completely covered.
    Cover,
}

/// How a variation is derived from its source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Derivation {
    /// Resize into a `width` x `height` box.
    Resize {
        width: u32,
        height: u32,
        #[serde(default)]
        fit: Fit,
    },
    /// Center-cropped square thumbnail.
    Square { size: u32 },
    /// Rotate clockwise by `degrees` (multiple of 90), then resize to fit.
    Rotate { degrees: u16, width: u32, height: u32 },
    /// Single frame grabbed from a video.
    Screenshot { at_secs: f64 },
    /// Re-encoded video bounded by the given dimensions.
    Transcode { max_width: u32, max_height: u32 },
}

impl Derivation {
    pub fn label(&self) -> &'static str {
        match self {
            Derivation::Resize { .. } => "resize",
            Derivation::Square { .. } => "square",
            Derivation::Rotate { .. } => "rotate",
            Derivation::Screenshot { .. } => "screenshot",
            Derivation::Transcode { .. } => "transcode",
        }
    }
}

/// A named derived representation of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariationDefinition {
    pub name: String,
    pub mime_type: String,
    /// Lower values are processed first.
    pub priority: i32,
    /// Name of the variation this one is derived from; `None` means the original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub derivation: Derivation,
}

impl VariationDefinition {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        priority: i32,
        derivation: Derivation,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            priority,
            source: None,
            derivation,
        }
    }

    /// Derive this variation from another variation instead of the original.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether this variation is produced directly from the original.
    pub fn is_root(&self) -> bool {
        self.source.is_none()
    }

    pub fn category(&self) -> MimeCategory {
        MimeCategory::from_mime(&self.mime_type)
    }
}
