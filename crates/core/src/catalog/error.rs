//! Error types for the variation catalog.

use thiserror::Error;

use super::{ArtifactType, MimeCategory};

/// Catalog lookup and validation errors. All of these are configuration
/// errors: they indicate a broken declaration, not a bad upload.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No entry declared for this (type, category) pair.
    #[error("No variations declared for {artifact_type} with {category} content")]
    UnknownArtifactType {
        artifact_type: ArtifactType,
        category: MimeCategory,
    },

    /// A string did not name a known artifact type or category.
    #[error("Unknown type name: {0}")]
    UnknownTypeName(String),

    /// A lookup named a variation that is not declared.
    #[error("Unknown variation '{variation}' for {artifact_type}/{category}")]
    UnknownVariation {
        artifact_type: ArtifactType,
        category: MimeCategory,
        variation: String,
    },

    /// Entry declared twice.
    #[error("Duplicate catalog entry for {artifact_type}/{category}")]
    DuplicateEntry {
        artifact_type: ArtifactType,
        category: MimeCategory,
    },

    /// Two variations with the same name in one entry.
    #[error("Duplicate variation '{variation}' in {artifact_type}/{category}")]
    DuplicateVariation {
        artifact_type: ArtifactType,
        category: MimeCategory,
        variation: String,
    },

    /// Variation name does not match `^[a-z0-9][a-z0-9-]*$`.
    #[error("Invalid variation name '{name}'")]
    InvalidName { name: String },

    /// Name collides with a directory the storage layout uses itself.
    #[error("Variation name '{name}' is reserved")]
    ReservedName { name: String },

    /// Derivation parameters no processor can honor.
    #[error("Variation '{variation}' has an invalid derivation: {reason}")]
    InvalidDerivation { variation: String, reason: String },

    /// Variation lists itself as its source.
    #[error("Variation '{variation}' in {artifact_type}/{category} is its own source")]
    SelfSource {
        artifact_type: ArtifactType,
        category: MimeCategory,
        variation: String,
    },

    /// Source refers to a variation not declared in the same entry.
    #[error("Variation '{variation}' in {artifact_type}/{category} has unknown source '{source_name}'")]
    UnknownSource {
        artifact_type: ArtifactType,
        category: MimeCategory,
        variation: String,
        source_name: String,
    },

    /// Source relation loops back on itself.
    #[error("Source cycle in {artifact_type}/{category}: {}", .path.join(" -> "))]
    Cycle {
        artifact_type: ArtifactType,
        category: MimeCategory,
        path: Vec<String>,
    },
}
