//! Durable priority queues, one per (stage, MIME category).

mod manager;
mod sqlite_store;
mod store;
mod types;

pub use manager::JobQueueManager;
pub use sqlite_store::SqliteJobStore;
pub use store::{JobStore, QueueError};
pub use types::{Job, JobFilter, JobState, NewJob, QueueKey, QueueStats, Stage, Target};
