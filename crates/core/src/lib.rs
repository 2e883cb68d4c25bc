//! Media variation processing.
//!
//! An uploaded artifact fans out into derived variations declared by the
//! [`catalog`]. Work is persisted in per-(stage, category) [`queue`]s,
//! executed by [`worker`]s that publish with an atomic rename, and awaited
//! by readers through the [`sync`] module.

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod queue;
mod sqlite;
pub mod storage;
pub mod sync;
pub mod testing;
pub mod worker;

pub use artifact::{Artifact, ArtifactError, ArtifactStore, SqliteArtifactStore, VariationInfo};
pub use catalog::{
    ArtifactType, CatalogError, Derivation, Fit, MimeCategory, VariationCatalog,
    VariationDefinition,
};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use metadata::{Metadata, MetadataError, MetadataExtractor, MetadataRegistry};
pub use pipeline::{DeletionReport, Pipeline, PipelineContext, PipelineError};
pub use processor::{FfmpegConfig, FfmpegRunner, Processor, ProcessorError, ProcessorKind, ProcessorRegistry};
pub use queue::{Job, JobQueueManager, JobStore, QueueError, QueueKey, QueueStats, SqliteJobStore, Stage};
pub use storage::StorageLayout;
pub use sync::{CompletionEvent, CompletionSynchronizer, SyncError};
pub use worker::{JobOutcome, Worker, WorkerPool, WorkerPoolConfig};
