//! Job store trait and errors.

use thiserror::Error;

use super::{Job, JobFilter, NewJob, QueueKey, QueueStats};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Durable storage for queued jobs and deletion markers.
///
/// `pop` is the only ownership primitive: it must atomically move exactly one
/// waiting job to active, so two workers never receive the same job.
pub trait JobStore: Send + Sync {
    /// Append a waiting job.
    fn push(&self, job: NewJob) -> Result<Job, QueueError>;

    /// Claim the most urgent waiting job of a queue (lowest priority, then oldest).
    fn pop(&self, queue: QueueKey) -> Result<Option<Job>, QueueError>;

    /// Delete a job regardless of state. Returns whether it existed.
    fn remove(&self, id: &str) -> Result<bool, QueueError>;

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError>;

    fn count(&self, filter: &JobFilter) -> Result<usize, QueueError>;

    /// Delete every waiting job of an artifact and return them.
    fn remove_waiting(&self, artifact_id: &str) -> Result<Vec<Job>, QueueError>;

    /// Return all active jobs to waiting. Returns how many were reset.
    fn reset_active(&self) -> Result<usize, QueueError>;

    /// Waiting/active counts for every queue, including empty ones.
    fn stats(&self) -> Result<Vec<QueueStats>, QueueError>;

    fn set_deletion_marker(&self, artifact_id: &str) -> Result<(), QueueError>;

    fn has_deletion_marker(&self, artifact_id: &str) -> Result<bool, QueueError>;

    fn clear_deletion_marker(&self, artifact_id: &str) -> Result<(), QueueError>;
}
