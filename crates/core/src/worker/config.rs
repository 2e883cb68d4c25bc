//! Worker pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::queue::Stage;

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerPoolConfig {
    /// Concurrent jobs per creation queue.
    #[serde(default = "default_creation_concurrency")]
    pub creation_concurrency: usize,

    /// Concurrent jobs per optimization queue.
    #[serde(default = "default_optimization_concurrency")]
    pub optimization_concurrency: usize,

    /// How long a variation-sourced job waits for its source (seconds).
    #[serde(default = "default_source_wait_timeout")]
    pub source_wait_timeout_secs: u64,
}

fn default_creation_concurrency() -> usize {
    2
}

fn default_optimization_concurrency() -> usize {
    1
}

fn default_source_wait_timeout() -> u64 {
    600
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            creation_concurrency: default_creation_concurrency(),
            optimization_concurrency: default_optimization_concurrency(),
            source_wait_timeout_secs: default_source_wait_timeout(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn concurrency(&self, stage: Stage) -> usize {
        match stage {
            Stage::Creation => self.creation_concurrency,
            Stage::Optimization => self.optimization_concurrency,
        }
    }

    pub fn source_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.source_wait_timeout_secs)
    }
}
