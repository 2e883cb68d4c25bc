//! Core artifact data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{ArtifactType, MimeCategory};

/// An uploaded file and everything the pipeline learned about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub artifact_type: ArtifactType,
    pub mime_type: String,
    pub bytes: u64,
    /// Detailed metadata of the original. Absent until extraction succeeds;
    /// an artifact without metadata is not browsable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Per-variation facts, keyed by variation name.
    #[serde(default)]
    pub variations: BTreeMap<String, VariationInfo>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        id: impl Into<String>,
        artifact_type: ArtifactType,
        mime_type: impl Into<String>,
        bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            artifact_type,
            mime_type: mime_type.into(),
            bytes,
            metadata: None,
            variations: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn category(&self) -> MimeCategory {
        MimeCategory::from_mime(&self.mime_type)
    }

    /// Whether metadata extraction has succeeded for the original.
    pub fn is_browsable(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn variation(&self, name: &str) -> Option<&VariationInfo> {
        self.variations.get(name)
    }
}

/// What is known about one published variation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariationInfo {
    pub bytes: u64,
    pub mime_type: String,
    /// Minimal metadata view (dimensions, duration).
    pub metadata: serde_json::Value,
}
