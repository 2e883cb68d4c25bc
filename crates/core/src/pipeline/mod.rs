//! Entry points used by ingestion, readers and operational tooling.

mod context;
mod error;

pub use context::PipelineContext;
pub use error::PipelineError;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactError};
use crate::queue::{Job, QueueStats};
use crate::storage;
use crate::sync::{CompletionEvent, SyncError};

/// What [`Pipeline::delete_artifact`] did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    /// Waiting jobs removed from their queues.
    pub cancelled_jobs: usize,
    /// Jobs still running; they will not publish.
    pub active_jobs: usize,
    /// Whether the deletion marker was left for active jobs.
    pub marked: bool,
    pub removed_files: Vec<PathBuf>,
}

/// Facade over a [`PipelineContext`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
}

impl Pipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Where ingestion stores the original of `artifact`.
    pub fn original_path(&self, artifact: &Artifact) -> PathBuf {
        self.ctx.canonical_path(artifact, None)
    }

    /// Schedule every variation derived from the original at `source_path`,
    /// plus optimizations of the original itself.
    ///
    /// Processors for all root variations are resolved before anything is
    /// queued, so a misconfigured catalog queues nothing. Calling this again
    /// after the original was rewritten regenerates all variations.
    pub fn process_file(&self, artifact: &Artifact, source_path: &Path) -> Result<Vec<Job>, PipelineError> {
        let roots = self
            .ctx
            .catalog
            .roots(artifact.artifact_type, &artifact.mime_type)?;

        let mut planned = Vec::with_capacity(roots.len());
        for root in roots {
            match self.ctx.processors.creation_processor_for(artifact, None, root)? {
                Some(processor) => planned.push((processor, root)),
                None => debug!(
                    artifact_id = %artifact.id,
                    variation = %root.name,
                    "No creation processor for variation"
                ),
            }
        }

        let mut jobs = Vec::new();
        for (processor, root) in planned {
            let dest_path = self.ctx.canonical_path(artifact, Some(root));
            jobs.push(self.ctx.queue.enqueue(
                processor.queue_class(),
                &*processor,
                artifact,
                source_path,
                &dest_path,
                None,
                Some(root),
            )?);
        }
        jobs.extend(self.ctx.enqueue_optimizations(artifact, None, source_path)?);

        info!(
            artifact_id = %artifact.id,
            artifact_type = %artifact.artifact_type,
            jobs = jobs.len(),
            "Processing scheduled"
        );
        Ok(jobs)
    }

    /// Path of `variation` (`None` = the original) once it is published.
    ///
    /// Returns immediately when the file is already there. Waits up to
    /// `timeout` (default: the source wait timeout) while a job that will
    /// produce it is queued or running.
    pub async fn await_published(
        &self,
        artifact: &Artifact,
        variation: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<PathBuf, SyncError> {
        let timeout = timeout.unwrap_or(self.ctx.source_wait_timeout);
        let Some(name) = variation else {
            let path = self.original_path(artifact);
            return self
                .ctx
                .synchronizer
                .await_published(&self.ctx.queue, &artifact.id, None, &path, &[], timeout)
                .await;
        };

        let unknown = || SyncError::UnknownVariation {
            variation: name.to_string(),
        };
        let lineage = self
            .ctx
            .catalog
            .lineage(artifact.artifact_type, &artifact.mime_type, name)
            .map_err(|_| unknown())?;
        let definition = lineage.first().copied().ok_or_else(unknown)?;
        let names: Vec<&str> = lineage.iter().map(|v| v.name.as_str()).collect();
        let path = self.ctx.canonical_path(artifact, Some(definition));

        self.ctx
            .synchronizer
            .await_published(&self.ctx.queue, &artifact.id, Some(name), &path, &names, timeout)
            .await
    }

    /// Remove an artifact: cancel its waiting jobs, stop running jobs from
    /// publishing, delete its published variation files (and the original
    /// when `remove_original` is set) and its record.
    pub async fn delete_artifact(
        &self,
        artifact: &Artifact,
        remove_original: bool,
    ) -> Result<DeletionReport, PipelineError> {
        let mut report = DeletionReport {
            cancelled_jobs: self.ctx.queue.cancel_waiting(&artifact.id)?.len(),
            ..Default::default()
        };

        report.active_jobs = self.ctx.queue.list_active(&artifact.id)?.len();
        if report.active_jobs > 0 {
            self.ctx.queue.mark_deleted(&artifact.id)?;
            report.marked = true;
        }

        match self.ctx.artifacts.delete(&artifact.id) {
            Ok(_) | Err(ArtifactError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let variations = self
            .ctx
            .catalog
            .variations_for(artifact.artifact_type, &artifact.mime_type)
            .unwrap_or_default();
        let mut paths: Vec<PathBuf> = variations
            .iter()
            .map(|v| self.ctx.canonical_path(artifact, Some(v)))
            .collect();
        if remove_original {
            paths.push(self.original_path(artifact));
        }
        for path in paths {
            if storage::remove_if_exists(&path).await? {
                report.removed_files.push(path);
            }
        }

        for variation in variations {
            self.ctx
                .synchronizer
                .notify(&artifact.id, Some(&variation.name), CompletionEvent::Cancelled);
        }

        info!(
            artifact_id = %artifact.id,
            cancelled = report.cancelled_jobs,
            active = report.active_jobs,
            removed = report.removed_files.len(),
            "Artifact deleted"
        );
        Ok(report)
    }

    /// Drop every waiting job of an artifact without deleting anything.
    pub fn cancel_all(&self, artifact_id: &str) -> Result<Vec<Job>, PipelineError> {
        let cancelled = self.ctx.queue.cancel_waiting(artifact_id)?;
        for job in &cancelled {
            self.ctx
                .synchronizer
                .notify(artifact_id, job.target(), CompletionEvent::Cancelled);
        }
        Ok(cancelled)
    }

    /// Waiting and active counts of every queue.
    pub fn stats(&self) -> Result<Vec<QueueStats>, PipelineError> {
        Ok(self.ctx.queue.stats()?)
    }
}
