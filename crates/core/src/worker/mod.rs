//! Job execution.
//!
//! A [`Worker`] takes one dequeued job through processing, metadata
//! extraction, publishing and chaining. The [`WorkerPool`] keeps a fixed
//! number of workers attached to every queue.

mod config;
mod executor;
mod pool;

pub use config::WorkerPoolConfig;
pub use executor::{JobOutcome, Worker};
pub use pool::{PoolStatus, WorkerPool, WorkerPoolStatus};
