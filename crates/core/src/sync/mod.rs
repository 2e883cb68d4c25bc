//! In-process fan-out of "variation published" events.
//!
//! The job queue stays the source of truth for whether work is pending; the
//! synchronizer only wakes waiters that are already subscribed. Waiters
//! always subscribe before re-checking the file and the queue, so an event
//! fired between those checks is buffered in their receiver.
//!
//! Workers in another process never reach these channels, so a subscribed
//! waiter also re-checks the file and the queue every poll interval.

mod error;

pub use error::SyncError;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::metrics;
use crate::queue::JobQueueManager;
use crate::storage;

/// Buffered events per (artifact, variation) channel.
const CHANNEL_CAPACITY: usize = 8;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What happened to a (artifact, variation) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    Published { path: PathBuf },
    Failed { reason: String },
    /// The artifact was deleted while the job ran.
    Cancelled,
}

type WaitKey = (String, Option<String>);
type Channels = Arc<Mutex<HashMap<WaitKey, broadcast::Sender<CompletionEvent>>>>;

/// Keyed broadcast channels, one per (artifact id, variation) with waiters.
#[derive(Clone)]
pub struct CompletionSynchronizer {
    channels: Channels,
    poll_interval: Duration,
}

impl Default for CompletionSynchronizer {
    fn default() -> Self {
        Self {
            channels: Channels::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A live subscription; the channel is removed when its last subscriber drops.
pub struct Subscription {
    key: WaitKey,
    receiver: broadcast::Receiver<CompletionEvent>,
    channels: Channels,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<CompletionEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// An already buffered event, if any.
    pub fn try_recv(&mut self) -> Option<CompletionEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut channels = lock(&self.channels);
        let unused = channels
            .get(&self.key)
            .map(|sender| sender.receiver_count() <= 1)
            .unwrap_or(false);
        if unused {
            channels.remove(&self.key);
        }
    }
}

fn lock(channels: &Channels) -> MutexGuard<'_, HashMap<WaitKey, broadcast::Sender<CompletionEvent>>> {
    channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn key(artifact_id: &str, variation: Option<&str>) -> WaitKey {
    (artifact_id.to_string(), variation.map(str::to_string))
}

impl CompletionSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often a subscribed waiter re-checks the file and the queue.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn subscribe(&self, artifact_id: &str, variation: Option<&str>) -> Subscription {
        let key = key(artifact_id, variation);
        let receiver = lock(&self.channels)
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            key,
            receiver,
            channels: Arc::clone(&self.channels),
        }
    }

    /// Deliver `event` to current subscribers. Returns how many received it.
    pub fn notify(&self, artifact_id: &str, variation: Option<&str>, event: CompletionEvent) -> usize {
        let channels = lock(&self.channels);
        match channels.get(&key(artifact_id, variation)) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Keys that currently have at least one subscriber.
    pub fn waiting_keys(&self) -> Vec<(String, Option<String>)> {
        lock(&self.channels).keys().cloned().collect()
    }

    /// Wait until the file for (artifact, variation) at `path` is published.
    ///
    /// `lineage` holds the variation followed by its ancestors; a job pending
    /// for any of them means the file will eventually be produced. If the
    /// file is missing and nothing is pending, this fails with `NoSuchJob`
    /// instead of waiting. If the pending jobs drain while the file is still
    /// missing, they ended without publishing and this fails with `Failed`.
    /// A timeout leaves the job untouched.
    pub async fn await_published(
        &self,
        queue: &JobQueueManager,
        artifact_id: &str,
        variation: Option<&str>,
        path: &Path,
        lineage: &[&str],
        timeout: Duration,
    ) -> Result<PathBuf, SyncError> {
        if storage::is_ready(path).await {
            record_wait("ready");
            return Ok(path.to_path_buf());
        }

        let mut subscription = self.subscribe(artifact_id, variation);
        if storage::is_ready(path).await {
            record_wait("ready");
            return Ok(path.to_path_buf());
        }

        let pending = pending_in_lineage(queue, artifact_id, variation, lineage)?;
        if pending == 0 {
            // The job may have finished between the file check and the count.
            if let Some(event) = subscription.try_recv() {
                return finish(event);
            }
            if storage::is_ready(path).await {
                record_wait("ready");
                return Ok(path.to_path_buf());
            }
            record_wait("no_job");
            return Err(SyncError::NoSuchJob {
                artifact_id: artifact_id.to_string(),
                variation: variation.unwrap_or("original").to_string(),
            });
        }

        debug!(
            artifact_id,
            variation = variation.unwrap_or("original"),
            pending,
            "Waiting for publish"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let wait = async {
            loop {
                tokio::select! {
                    received = subscription.recv() => match received {
                        Ok(event) => return finish(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(artifact_id, skipped, "Publish waiter lagged");
                            if storage::is_ready(path).await {
                                record_wait("published");
                                return Ok(path.to_path_buf());
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            record_wait("closed");
                            return Err(SyncError::Closed);
                        }
                    },
                    _ = ticker.tick() => {
                        if storage::is_ready(path).await {
                            record_wait("published");
                            return Ok(path.to_path_buf());
                        }
                        if pending_in_lineage(queue, artifact_id, variation, lineage)? > 0 {
                            continue;
                        }
                        // A job completes only after its rename, so the file
                        // is checked once more before giving up.
                        if let Some(event) = subscription.try_recv() {
                            return finish(event);
                        }
                        if storage::is_ready(path).await {
                            record_wait("published");
                            return Ok(path.to_path_buf());
                        }
                        record_wait("failed");
                        return Err(SyncError::Failed {
                            reason: "job ended without publishing".to_string(),
                        });
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                record_wait("timeout");
                Err(SyncError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

/// Jobs waiting or active for `variation` and any of its ancestors.
fn pending_in_lineage(
    queue: &JobQueueManager,
    artifact_id: &str,
    variation: Option<&str>,
    lineage: &[&str],
) -> Result<usize, SyncError> {
    let mut pending = queue.pending(artifact_id, variation)?;
    for ancestor in lineage.iter().filter(|name| Some(**name) != variation) {
        pending += queue.pending(artifact_id, Some(ancestor))?;
    }
    Ok(pending)
}

fn finish(event: CompletionEvent) -> Result<PathBuf, SyncError> {
    match event {
        CompletionEvent::Published { path } => {
            record_wait("published");
            Ok(path)
        }
        CompletionEvent::Failed { reason } => {
            record_wait("failed");
            Err(SyncError::Failed { reason })
        }
        CompletionEvent::Cancelled => {
            record_wait("cancelled");
            Err(SyncError::Cancelled)
        }
    }
}

fn record_wait(result: &str) {
    metrics::PUBLISH_WAITS.with_label_values(&[result]).inc();
}

impl std::fmt::Debug for CompletionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSynchronizer")
            .field("waiting", &lock(&self.channels).len())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
