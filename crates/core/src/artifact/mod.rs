//! Artifact records: the persistence collaborator's view of an upload.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteArtifactStore;
pub use store::{ArtifactError, ArtifactStore};
pub use types::{Artifact, VariationInfo};
