//! Artifact store trait and errors.

use std::fmt;

use serde_json::Value;

use super::{Artifact, VariationInfo};

/// Errors that can occur during artifact store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// Artifact not found.
    NotFound(String),
    /// An artifact with this id already exists.
    AlreadyExists(String),
    /// Database error.
    Database(String),
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::NotFound(id) => write!(f, "Artifact not found: {}", id),
            ArtifactError::AlreadyExists(id) => write!(f, "Artifact already exists: {}", id),
            ArtifactError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for ArtifactError {}

/// Persistence interface for artifact records.
///
/// Metadata writes are targeted: `set_variation` touches exactly one
/// (artifact, variation) row so concurrent jobs for different variations of
/// the same artifact never overwrite each other.
pub trait ArtifactStore: Send + Sync {
    /// Store a new artifact record.
    fn insert(&self, artifact: &Artifact) -> Result<(), ArtifactError>;

    /// Get an artifact by ID, including its variation records.
    fn get(&self, id: &str) -> Result<Option<Artifact>, ArtifactError>;

    /// Set the detailed metadata (and measured size) of the original.
    fn set_metadata(&self, id: &str, metadata: &Value, bytes: u64) -> Result<(), ArtifactError>;

    /// Insert or replace the record of a single variation.
    fn set_variation(
        &self,
        id: &str,
        variation: &str,
        info: &VariationInfo,
    ) -> Result<(), ArtifactError>;

    /// Permanently delete an artifact and its variation records.
    /// Returns the deleted artifact if found.
    fn delete(&self, id: &str) -> Result<Artifact, ArtifactError>;
}
