//! Job queue manager: routing, enqueue/dequeue and wake-ups.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info};

use super::{Job, JobFilter, JobState, JobStore, NewJob, QueueError, QueueKey, QueueStats, Stage, Target};
use crate::artifact::Artifact;
use crate::catalog::{MimeCategory, VariationDefinition};
use crate::metrics;
use crate::processor::{target_mime, Processor, ProcessorKind};

/// Front door to the queue matrix.
///
/// Owns one [`Notify`] per queue so idle workers wake as soon as work for
/// their queue arrives; the store stays the source of truth.
pub struct JobQueueManager {
    store: Arc<dyn JobStore>,
    notifiers: HashMap<QueueKey, Arc<Notify>>,
}

impl JobQueueManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        let notifiers = QueueKey::all()
            .into_iter()
            .map(|key| (key, Arc::new(Notify::new())))
            .collect();
        Self { store, notifiers }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Queue a job for `processor`.
    ///
    /// The queue is chosen from `stage` and the MIME category of the file the
    /// job produces. Creation jobs that read another variation go to the
    /// optimization-stage queue of that category, so waiting on their source
    /// never blocks the fast lane.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &self,
        stage: Stage,
        processor: &dyn Processor,
        artifact: &Artifact,
        src_path: &Path,
        dest_path: &Path,
        src_variation: Option<&VariationDefinition>,
        dest_variation: Option<&VariationDefinition>,
    ) -> Result<Job, QueueError> {
        let kind = processor.kind();
        let stage = if kind == ProcessorKind::Creation && src_variation.is_some() {
            Stage::Optimization
        } else {
            stage
        };
        let category =
            MimeCategory::from_mime(target_mime(artifact, src_variation, dest_variation));
        let queue = QueueKey::new(stage, category);

        let job = self.store.push(NewJob {
            artifact_id: artifact.id.clone(),
            processor: processor.name().to_string(),
            kind,
            queue,
            src_path: src_path.to_path_buf(),
            dest_path: dest_path.to_path_buf(),
            src_variation: src_variation.map(|v| v.name.clone()),
            dest_variation: dest_variation.map(|v| v.name.clone()),
            priority: processor.priority(dest_variation.or(src_variation)),
        })?;

        debug!(
            job_id = %job.id,
            artifact_id = %job.artifact_id,
            processor = %job.processor,
            queue = %queue,
            priority = job.priority,
            variation = job.target().unwrap_or("original"),
            "Job enqueued"
        );
        metrics::JOBS_ENQUEUED
            .with_label_values(&[&queue.to_string()])
            .inc();

        self.wake(queue);
        Ok(job)
    }

    /// Claim the next job of `queue`, if any.
    pub fn dequeue(&self, queue: QueueKey) -> Result<Option<Job>, QueueError> {
        self.store.pop(queue)
    }

    /// Remove a finished job (whatever its outcome).
    pub fn complete(&self, job: &Job) -> Result<(), QueueError> {
        self.store.remove(&job.id)?;
        Ok(())
    }

    /// Jobs (waiting or active) of `artifact_id` that produce `variation`
    /// (`None` = the original).
    pub fn pending(&self, artifact_id: &str, variation: Option<&str>) -> Result<usize, QueueError> {
        self.store.count(
            &JobFilter::for_artifact(artifact_id).with_target(Target::from_variation(variation)),
        )
    }

    /// All jobs (waiting or active) of an artifact.
    pub fn pending_any(&self, artifact_id: &str) -> Result<usize, QueueError> {
        self.store.count(&JobFilter::for_artifact(artifact_id))
    }

    /// Remove and return every waiting job of an artifact. Active jobs are untouched.
    pub fn cancel_waiting(&self, artifact_id: &str) -> Result<Vec<Job>, QueueError> {
        let cancelled = self.store.remove_waiting(artifact_id)?;
        if !cancelled.is_empty() {
            info!(artifact_id, count = cancelled.len(), "Cancelled waiting jobs");
            metrics::JOBS_CANCELLED.inc_by(cancelled.len() as u64);
        }
        Ok(cancelled)
    }

    pub fn list_active(&self, artifact_id: &str) -> Result<Vec<Job>, QueueError> {
        self.store
            .list(&JobFilter::for_artifact(artifact_id).with_state(JobState::Active))
    }

    pub fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        self.store.list(filter)
    }

    /// Return jobs left active by a crashed process to waiting.
    pub fn recover_stalled(&self) -> Result<usize, QueueError> {
        let recovered = self.store.reset_active()?;
        if recovered > 0 {
            info!(recovered, "Recovered stalled jobs");
            for queue in self.notifiers.keys() {
                self.wake(*queue);
            }
        }
        Ok(recovered)
    }

    /// Per-queue counts; also refreshes the depth gauges.
    pub fn stats(&self) -> Result<Vec<QueueStats>, QueueError> {
        let stats = self.store.stats()?;
        for s in &stats {
            let queue = s.queue.to_string();
            metrics::QUEUE_DEPTH
                .with_label_values(&[&queue, "waiting"])
                .set(s.waiting as i64);
            metrics::QUEUE_DEPTH
                .with_label_values(&[&queue, "active"])
                .set(s.active as i64);
        }
        Ok(stats)
    }

    /// Handle workers of `queue` wait on.
    pub fn notifier(&self, queue: QueueKey) -> Arc<Notify> {
        match self.notifiers.get(&queue) {
            Some(notify) => Arc::clone(notify),
            // Every key is created in `new`; keep a detached handle just in case.
            None => Arc::new(Notify::new()),
        }
    }

    fn wake(&self, queue: QueueKey) {
        if let Some(notify) = self.notifiers.get(&queue) {
            notify.notify_one();
        }
    }

    pub fn mark_deleted(&self, artifact_id: &str) -> Result<(), QueueError> {
        self.store.set_deletion_marker(artifact_id)
    }

    pub fn is_marked_deleted(&self, artifact_id: &str) -> Result<bool, QueueError> {
        self.store.has_deletion_marker(artifact_id)
    }

    /// Drop the deletion marker once no job of the artifact is active any more.
    /// Returns whether the marker was cleared.
    pub fn release_deletion_marker(&self, artifact_id: &str) -> Result<bool, QueueError> {
        if !self.store.has_deletion_marker(artifact_id)? {
            return Ok(false);
        }
        if !self.list_active(artifact_id)?.is_empty() {
            return Ok(false);
        }
        self.store.clear_deletion_marker(artifact_id)?;
        debug!(artifact_id, "Deletion marker cleared");
        Ok(true)
    }
}
