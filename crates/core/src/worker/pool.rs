//! Long-running workers, one task group per queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{JobOutcome, Worker, WorkerPoolConfig};
use crate::pipeline::PipelineContext;
use crate::queue::{QueueKey, Stage};

/// Tracks statistics for the workers of one stage.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

impl PoolStats {
    fn to_status(&self, stage: Stage, workers_per_queue: usize) -> PoolStatus {
        PoolStatus {
            stage,
            workers_per_queue,
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &JobOutcome) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        if matches!(outcome, JobOutcome::Failed { .. }) {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Status of the workers of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub stage: Stage,
    pub workers_per_queue: usize,
    pub active_jobs: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStatus {
    pub running: bool,
    pub pools: Vec<PoolStatus>,
}

/// Drains every queue with a fixed number of tasks per queue.
///
/// Idle tasks wake on the queue's notifier, or after the poll interval to
/// pick up jobs written by another process sharing the database.
pub struct WorkerPool {
    ctx: Arc<PipelineContext>,
    config: WorkerPoolConfig,
    poll_interval: Duration,
    stats: Arc<HashMap<Stage, PoolStats>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(ctx: Arc<PipelineContext>, config: WorkerPoolConfig, poll_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let stats = Stage::ALL
            .iter()
            .map(|stage| (*stage, PoolStats::default()))
            .collect();
        Self {
            ctx,
            config,
            poll_interval,
            stats: Arc::new(stats),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the worker tasks.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        let mut handles = self.handles.lock().await;
        for queue in QueueKey::all() {
            for index in 0..self.config.concurrency(queue.stage) {
                handles.push(self.spawn_worker(queue, index));
            }
        }
        info!(workers = handles.len(), "Worker pool started");
    }

    /// Signal shutdown and wait for in-flight jobs to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        let _ = self.shutdown_tx.send(());
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }

    pub fn status(&self) -> WorkerPoolStatus {
        WorkerPoolStatus {
            running: self.is_running(),
            pools: Stage::ALL
                .iter()
                .filter_map(|stage| {
                    self.stats
                        .get(stage)
                        .map(|s| s.to_status(*stage, self.config.concurrency(*stage)))
                })
                .collect(),
        }
    }

    fn spawn_worker(&self, queue: QueueKey, index: usize) -> JoinHandle<()> {
        let worker = Worker::new(Arc::clone(&self.ctx));
        let manager = Arc::clone(&self.ctx.queue);
        let notify = manager.notifier(queue);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(queue = %queue, index, "Worker started");
            loop {
                while running.load(Ordering::SeqCst) {
                    let job = match manager.dequeue(queue) {
                        Ok(Some(job)) => job,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(queue = %queue, error = %e, "Failed to dequeue");
                            break;
                        }
                    };
                    // Let a sibling look for more work while this one is busy.
                    notify.notify_one();

                    let stage_stats = stats.get(&queue.stage);
                    if let Some(s) = stage_stats {
                        s.active.fetch_add(1, Ordering::Relaxed);
                    }
                    let outcome = worker.run_job(job).await;
                    if let Some(s) = stage_stats {
                        s.active.fetch_sub(1, Ordering::Relaxed);
                        s.record(&outcome);
                    }
                }

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            debug!(queue = %queue, index, "Worker stopped");
        })
    }
}
