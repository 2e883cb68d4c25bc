//! Runs one dequeued job from source file to published file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::artifact::{Artifact, ArtifactError, VariationInfo};
use crate::catalog::{CatalogError, VariationCatalog, VariationDefinition};
use crate::metrics;
use crate::pipeline::{PipelineContext, PipelineError};
use crate::processor::{target_mime, Processor, ProcessorError, ProcessorKind};
use crate::queue::Job;
use crate::storage;
use crate::sync::CompletionEvent;

/// How a job ended. Every outcome removes the job from its queue.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The result was renamed into place.
    Published { path: PathBuf },
    /// The artifact no longer exists; nothing to do.
    Discarded,
    /// The artifact was marked for deletion while the job ran.
    Aborted,
    Failed { reason: String },
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Published { .. } => "published",
            JobOutcome::Discarded => "discarded",
            JobOutcome::Aborted => "aborted",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

/// Resolved catalog entries of a job.
struct Resolved<'a> {
    processor: Arc<dyn Processor>,
    src: Option<&'a VariationDefinition>,
    dest: Option<&'a VariationDefinition>,
}

impl Resolved<'_> {
    /// The variation whose file the job writes.
    fn target(&self) -> Option<&VariationDefinition> {
        self.dest.or(self.src)
    }
}

fn lookup<'a>(
    catalog: &'a VariationCatalog,
    artifact: &Artifact,
    name: Option<&str>,
) -> Result<Option<&'a VariationDefinition>, CatalogError> {
    name.map(|n| catalog.require_variation(artifact.artifact_type, &artifact.mime_type, n))
        .transpose()
}

/// Executes jobs against a [`PipelineContext`].
#[derive(Clone)]
pub struct Worker {
    ctx: Arc<PipelineContext>,
}

impl Worker {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Run `job` to completion and remove it from the queue.
    pub async fn run_job(&self, job: Job) -> JobOutcome {
        let started = Instant::now();
        debug!(
            job_id = %job.id,
            artifact_id = %job.artifact_id,
            processor = %job.processor,
            variation = job.target().unwrap_or("original"),
            "Job started"
        );

        let outcome = self.execute(&job).await;

        if let Err(e) = self.ctx.queue.complete(&job) {
            warn!(job_id = %job.id, error = %e, "Failed to remove finished job");
        }
        match self.ctx.queue.release_deletion_marker(&job.artifact_id) {
            Ok(true) => info!(artifact_id = %job.artifact_id, "Deletion finished, marker released"),
            Ok(false) => {}
            Err(e) => warn!(artifact_id = %job.artifact_id, error = %e, "Failed to release deletion marker"),
        }

        let queue = job.queue.to_string();
        metrics::JOBS_PROCESSED
            .with_label_values(&[&queue, &job.processor, outcome.as_str()])
            .inc();
        metrics::JOB_DURATION
            .with_label_values(&[&queue, &job.processor])
            .observe(started.elapsed().as_secs_f64());

        outcome
    }

    async fn execute(&self, job: &Job) -> JobOutcome {
        let artifact = match self.ctx.artifacts.get(&job.artifact_id) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                info!(
                    job_id = %job.id,
                    artifact_id = %job.artifact_id,
                    "Artifact no longer exists, discarding job"
                );
                return JobOutcome::Discarded;
            }
            Err(e) => return self.fail(job, None, None, e.into()),
        };

        let resolved = match self.resolve(job, &artifact) {
            Ok(resolved) => resolved,
            Err(e) => return self.fail(job, Some(&artifact), None, e),
        };

        match self.process(job, &artifact, &resolved).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(job, Some(&artifact), resolved.dest, e),
        }
    }

    fn resolve<'a>(&'a self, job: &Job, artifact: &Artifact) -> Result<Resolved<'a>, PipelineError> {
        let processor = self
            .ctx
            .processors
            .get(&job.processor)
            .ok_or_else(|| ProcessorError::UnknownProcessor(job.processor.clone()))?;
        let catalog = self.ctx.catalog.as_ref();
        Ok(Resolved {
            processor,
            src: lookup(catalog, artifact, job.src_variation.as_deref())?,
            dest: lookup(catalog, artifact, job.dest_variation.as_deref())?,
        })
    }

    async fn process(
        &self,
        job: &Job,
        artifact: &Artifact,
        resolved: &Resolved<'_>,
    ) -> Result<JobOutcome, PipelineError> {
        let src_path = self.source_path(job, artifact).await?;

        if let Some(parent) = job.dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.ctx.layout.temp_path(
            &job.dest_path,
            &artifact.id,
            job.target(),
            &job.processor,
            &job.id,
        );
        let outcome = self.produce(job, artifact, resolved, &src_path, &temp).await;
        if !matches!(outcome, Ok(JobOutcome::Published { .. })) {
            if let Err(e) = storage::remove_if_exists(&temp).await {
                warn!(path = %temp.display(), error = %e, "Failed to remove temporary file");
            }
        }
        outcome
    }

    /// Where to read from. Variation-sourced jobs wait for their source.
    async fn source_path(&self, job: &Job, artifact: &Artifact) -> Result<PathBuf, PipelineError> {
        let Some(source) = job.src_variation.as_deref().filter(|_| job.is_variation_sourced()) else {
            return Ok(job.src_path.clone());
        };
        let lineage = self
            .ctx
            .catalog
            .lineage(artifact.artifact_type, &artifact.mime_type, source)?;
        let names: Vec<&str> = lineage.iter().map(|v| v.name.as_str()).collect();
        let path = self
            .ctx
            .synchronizer
            .await_published(
                &self.ctx.queue,
                &artifact.id,
                Some(source),
                &job.src_path,
                &names,
                self.ctx.source_wait_timeout,
            )
            .await?;
        Ok(path)
    }

    async fn produce(
        &self,
        job: &Job,
        artifact: &Artifact,
        resolved: &Resolved<'_>,
        src_path: &Path,
        temp: &Path,
    ) -> Result<JobOutcome, PipelineError> {
        resolved
            .processor
            .process(artifact, src_path, temp, resolved.target())
            .await?;
        if !storage::is_ready(temp).await {
            return Err(ProcessorError::EmptyOutput {
                path: temp.to_path_buf(),
            }
            .into());
        }

        let mime = target_mime(artifact, resolved.src, resolved.dest);
        let extractor = self.ctx.extractors.require(mime)?;
        let metadata = extractor.extract(temp, mime).await?;
        let stored = match resolved.target() {
            Some(variation) => self.ctx.artifacts.set_variation(
                &artifact.id,
                &variation.name,
                &VariationInfo {
                    bytes: metadata.bytes(),
                    mime_type: variation.mime_type.clone(),
                    metadata: extractor.variation_view(&metadata),
                },
            ),
            None => self.ctx.artifacts.set_metadata(
                &artifact.id,
                &extractor.detailed(&metadata),
                metadata.bytes(),
            ),
        };
        match stored {
            Ok(()) => {}
            Err(ArtifactError::NotFound(_)) => {
                info!(
                    job_id = %job.id,
                    artifact_id = %artifact.id,
                    "Artifact deleted during processing, discarding result"
                );
                return Ok(JobOutcome::Discarded);
            }
            Err(e) => return Err(e.into()),
        }

        if self.ctx.queue.is_marked_deleted(&artifact.id)? {
            info!(
                job_id = %job.id,
                artifact_id = %artifact.id,
                "Artifact marked for deletion, not publishing"
            );
            return Ok(self.abort(job, artifact, resolved));
        }

        storage::publish(temp, &job.dest_path).await?;

        // A deletion that marked the artifact after the check above may have
        // already swept the canonical paths.
        if self.ctx.queue.is_marked_deleted(&artifact.id)? {
            warn!(
                job_id = %job.id,
                artifact_id = %artifact.id,
                path = %job.dest_path.display(),
                "Artifact marked for deletion during publish, removing output"
            );
            storage::remove_if_exists(&job.dest_path).await?;
            return Ok(self.abort(job, artifact, resolved));
        }
        info!(
            job_id = %job.id,
            artifact_id = %artifact.id,
            processor = %job.processor,
            variation = job.target().unwrap_or("original"),
            path = %job.dest_path.display(),
            "Published"
        );

        if job.kind == ProcessorKind::Creation {
            if let Some(variation) = resolved.dest {
                match self.ctx.chain(artifact, variation, &job.dest_path) {
                    Ok(jobs) => debug!(artifact_id = %artifact.id, chained = jobs.len(), "Chained follow-up jobs"),
                    Err(e) => error!(
                        job_id = %job.id,
                        artifact_id = %artifact.id,
                        error = %e,
                        "Failed to chain follow-up jobs"
                    ),
                }
            }
        }

        self.ctx.synchronizer.notify(
            &artifact.id,
            job.target(),
            CompletionEvent::Published {
                path: job.dest_path.clone(),
            },
        );
        Ok(JobOutcome::Published {
            path: job.dest_path.clone(),
        })
    }

    fn abort(&self, job: &Job, artifact: &Artifact, resolved: &Resolved<'_>) -> JobOutcome {
        if job.kind == ProcessorKind::Creation {
            self.ctx
                .fail_waiters(artifact, resolved.target(), CompletionEvent::Cancelled);
        }
        JobOutcome::Aborted
    }

    fn fail(
        &self,
        job: &Job,
        artifact: Option<&Artifact>,
        dest: Option<&VariationDefinition>,
        err: PipelineError,
    ) -> JobOutcome {
        error!(
            job_id = %job.id,
            artifact_id = %job.artifact_id,
            processor = %job.processor,
            variation = job.target().unwrap_or("original"),
            error = %err,
            "Job failed"
        );
        let reason = err.to_string();
        if job.kind == ProcessorKind::Creation {
            let event = CompletionEvent::Failed {
                reason: reason.clone(),
            };
            match (artifact, dest) {
                (Some(artifact), Some(dest)) => self.ctx.fail_waiters(artifact, Some(dest), event),
                _ => {
                    self.ctx
                        .synchronizer
                        .notify(&job.artifact_id, job.target(), event);
                }
            }
        }
        JobOutcome::Failed { reason }
    }
}
