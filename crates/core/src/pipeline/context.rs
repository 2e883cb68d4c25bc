//! Shared state for ingestion, workers and readers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::PipelineError;
use crate::artifact::{Artifact, ArtifactStore};
use crate::catalog::{VariationCatalog, VariationDefinition};
use crate::metadata::MetadataRegistry;
use crate::processor::ProcessorRegistry;
use crate::queue::{Job, JobQueueManager, Stage};
use crate::storage::StorageLayout;
use crate::sync::{CompletionEvent, CompletionSynchronizer};

const DEFAULT_SOURCE_WAIT: Duration = Duration::from_secs(600);

/// Everything a job needs, constructed once and passed around explicitly.
pub struct PipelineContext {
    pub catalog: Arc<VariationCatalog>,
    pub processors: Arc<ProcessorRegistry>,
    pub extractors: Arc<MetadataRegistry>,
    pub queue: Arc<JobQueueManager>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub synchronizer: CompletionSynchronizer,
    pub layout: StorageLayout,
    /// Upper bound for a worker waiting on its source variation.
    pub source_wait_timeout: Duration,
}

impl PipelineContext {
    pub fn new(
        catalog: Arc<VariationCatalog>,
        processors: Arc<ProcessorRegistry>,
        extractors: Arc<MetadataRegistry>,
        queue: Arc<JobQueueManager>,
        artifacts: Arc<dyn ArtifactStore>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            catalog,
            processors,
            extractors,
            queue,
            artifacts,
            synchronizer: CompletionSynchronizer::new(),
            layout,
            source_wait_timeout: DEFAULT_SOURCE_WAIT,
        }
    }

    pub fn with_source_wait_timeout(mut self, timeout: Duration) -> Self {
        self.source_wait_timeout = timeout;
        self
    }

    /// How often readers re-check the queue for work done by other processes.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.synchronizer = self.synchronizer.with_poll_interval(interval);
        self
    }

    pub fn canonical_path(&self, artifact: &Artifact, variation: Option<&VariationDefinition>) -> PathBuf {
        self.layout.canonical_path(artifact, variation)
    }

    /// Queue the creation of `dest` from `src` (`None` = the original at `src_path`).
    ///
    /// Returns `Ok(None)` when no processor produces this variation.
    pub fn enqueue_creation(
        &self,
        artifact: &Artifact,
        src: Option<&VariationDefinition>,
        src_path: &Path,
        dest: &VariationDefinition,
    ) -> Result<Option<Job>, PipelineError> {
        let Some(processor) = self.processors.creation_processor_for(artifact, src, dest)? else {
            debug!(
                artifact_id = %artifact.id,
                variation = %dest.name,
                "No creation processor for variation"
            );
            return Ok(None);
        };
        let dest_path = self.canonical_path(artifact, Some(dest));
        let job = self.queue.enqueue(
            processor.queue_class(),
            &*processor,
            artifact,
            src_path,
            &dest_path,
            src,
            Some(dest),
        )?;
        Ok(Some(job))
    }

    /// Queue every matching optimization of the file at `path`.
    pub fn enqueue_optimizations(
        &self,
        artifact: &Artifact,
        variation: Option<&VariationDefinition>,
        path: &Path,
    ) -> Result<Vec<Job>, PipelineError> {
        let mut jobs = Vec::new();
        for processor in self.processors.optimization_processors_for(artifact, variation) {
            jobs.push(self.queue.enqueue(
                Stage::Optimization,
                &*processor,
                artifact,
                path,
                path,
                variation,
                variation,
            )?);
        }
        Ok(jobs)
    }

    /// Follow-up work once `published` exists at `path`: creation of its
    /// direct dependents and its optimizations.
    ///
    /// A dependent that cannot be queued is logged and its waiters are failed;
    /// the remaining dependents are still queued.
    pub fn chain(
        &self,
        artifact: &Artifact,
        published: &VariationDefinition,
        path: &Path,
    ) -> Result<Vec<Job>, PipelineError> {
        let mut jobs = Vec::new();
        let dependents =
            self.catalog
                .direct_dependents(artifact.artifact_type, &artifact.mime_type, &published.name)?;

        for dependent in dependents {
            match self.enqueue_creation(artifact, Some(published), path, dependent) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {
                    warn!(
                        artifact_id = %artifact.id,
                        variation = %dependent.name,
                        source = %published.name,
                        "Dependent variation has no creation processor"
                    );
                    self.fail_waiters(
                        artifact,
                        Some(dependent),
                        CompletionEvent::Failed {
                            reason: format!("no processor produces {}", dependent.name),
                        },
                    );
                }
                Err(e) => {
                    error!(
                        artifact_id = %artifact.id,
                        variation = %dependent.name,
                        error = %e,
                        "Failed to queue dependent variation"
                    );
                    self.fail_waiters(
                        artifact,
                        Some(dependent),
                        CompletionEvent::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        jobs.extend(self.enqueue_optimizations(artifact, Some(published), path)?);
        Ok(jobs)
    }

    /// Deliver `event` to waiters of `variation` and of everything derived from it.
    pub fn fail_waiters(
        &self,
        artifact: &Artifact,
        variation: Option<&VariationDefinition>,
        event: CompletionEvent,
    ) {
        let Some(variation) = variation else {
            self.synchronizer.notify(&artifact.id, None, event);
            return;
        };
        self.synchronizer
            .notify(&artifact.id, Some(&variation.name), event.clone());
        match self
            .catalog
            .all_dependents(artifact.artifact_type, &artifact.mime_type, &variation.name)
        {
            Ok(dependents) => {
                for dependent in dependents {
                    self.synchronizer
                        .notify(&artifact.id, Some(&dependent.name), event.clone());
                }
            }
            Err(e) => warn!(artifact_id = %artifact.id, error = %e, "Cannot resolve dependents"),
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("processors", &self.processors)
            .field("extractors", &self.extractors)
            .field("layout", &self.layout)
            .field("source_wait_timeout", &self.source_wait_timeout)
            .finish()
    }
}
