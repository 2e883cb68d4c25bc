//! Job and queue data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::catalog::MimeCategory;
use crate::processor::ProcessorKind;

/// Queue stage. Creation queues hold work derived straight from the
/// original; optimization queues are the slow lane (optimizations and
/// creation jobs sourced from another variation).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Creation,
    Optimization,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::Creation, Stage::Optimization];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Creation => "creation",
            Stage::Optimization => "optimization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creation" => Ok(Stage::Creation),
            "optimization" => Ok(Stage::Optimization),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// Identifies one queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueKey {
    pub stage: Stage,
    pub category: MimeCategory,
}

impl QueueKey {
    pub fn new(stage: Stage, category: MimeCategory) -> Self {
        Self { stage, category }
    }

    /// Every queue of the matrix, creation queues first.
    pub fn all() -> Vec<QueueKey> {
        Stage::ALL
            .iter()
            .flat_map(|stage| {
                MimeCategory::ALL
                    .iter()
                    .map(move |category| QueueKey::new(*stage, *category))
            })
            .collect()
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage, self.category)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
        }
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    /// Insertion order; FIFO tiebreak within a priority.
    pub seq: i64,
    pub artifact_id: String,
    pub processor: String,
    pub kind: ProcessorKind,
    pub queue: QueueKey,
    pub src_path: PathBuf,
    /// Canonical path the result is published to.
    pub dest_path: PathBuf,
    pub src_variation: Option<String>,
    pub dest_variation: Option<String>,
    pub priority: i32,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The variation this job produces or rewrites; `None` is the original.
    pub fn target(&self) -> Option<&str> {
        self.dest_variation
            .as_deref()
            .or(self.src_variation.as_deref())
    }

    /// Creation job whose input is another variation.
    pub fn is_variation_sourced(&self) -> bool {
        self.kind == ProcessorKind::Creation && self.src_variation.is_some()
    }
}

/// Request to push a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub artifact_id: String,
    pub processor: String,
    pub kind: ProcessorKind,
    pub queue: QueueKey,
    pub src_path: PathBuf,
    pub dest_path: PathBuf,
    pub src_variation: Option<String>,
    pub dest_variation: Option<String>,
    pub priority: i32,
}

impl NewJob {
    pub fn target(&self) -> Option<&str> {
        self.dest_variation
            .as_deref()
            .or(self.src_variation.as_deref())
    }
}

/// Which produced file a filter matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    Any,
    Original,
    Variation(String),
}

impl Target {
    pub fn from_variation(variation: Option<&str>) -> Self {
        match variation {
            Some(name) => Target::Variation(name.to_string()),
            None => Target::Original,
        }
    }
}

/// Filter for listing and counting jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub artifact_id: Option<String>,
    pub target: Target,
    pub state: Option<JobState>,
    pub queue: Option<QueueKey>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_artifact(artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_id: Some(artifact_id.into()),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_queue(mut self, queue: QueueKey) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Waiting/active counts for one queue.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: QueueKey,
    pub waiting: usize,
    pub active: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_matrix() {
        let all = QueueKey::all();
        assert_eq!(all.len(), 10);
        assert_eq!(all[0].to_string(), "creation:image");
        assert_eq!(all[9].to_string(), "optimization:other");
    }

    #[test]
    fn test_target_prefers_destination() {
        let mut job = Job {
            id: "j".to_string(),
            seq: 1,
            artifact_id: "a".to_string(),
            processor: "p".to_string(),
            kind: ProcessorKind::Creation,
            queue: QueueKey::new(Stage::Optimization, MimeCategory::Image),
            src_path: PathBuf::from("/m/medium/a.jpg"),
            dest_path: PathBuf::from("/m/square/a.jpg"),
            src_variation: Some("medium".to_string()),
            dest_variation: Some("square".to_string()),
            priority: 40,
            state: JobState::Waiting,
            created_at: Utc::now(),
            started_at: None,
        };
        assert_eq!(job.target(), Some("square"));
        assert!(job.is_variation_sourced());

        job.dest_variation = None;
        job.src_variation = None;
        job.kind = ProcessorKind::Optimization;
        assert_eq!(job.target(), None);
        assert!(!job.is_variation_sourced());
    }
}
