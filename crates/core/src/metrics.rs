//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queues (enqueued, cancelled, depth)
//! - Workers (jobs processed by outcome, job duration)
//! - Readers (publish waits by result)

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};

// =============================================================================
// Queue Metrics
// =============================================================================

/// Jobs enqueued by queue ("creation:image", ...).
pub static JOBS_ENQUEUED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("variations_jobs_enqueued_total", "Total jobs enqueued"),
        &["queue"],
    )
    .unwrap()
});

/// Waiting jobs removed before they ran.
pub static JOBS_CANCELLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "variations_jobs_cancelled_total",
        "Total waiting jobs cancelled",
    )
    .unwrap()
});

/// Current queue depth.
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("variations_queue_depth", "Jobs currently in each queue"),
        &["queue", "state"], // state: "waiting", "active"
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Jobs finished by outcome.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("variations_jobs_processed_total", "Total jobs processed"),
        &["queue", "processor", "outcome"], // outcome: "published", "failed", "discarded", "aborted"
    )
    .unwrap()
});

/// Job duration in seconds, from dequeue to completion.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "variations_job_duration_seconds",
            "Duration of a job from dequeue to completion",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["queue", "processor"],
    )
    .unwrap()
});

// =============================================================================
// Reader Metrics
// =============================================================================

/// Publish waits by result.
pub static PUBLISH_WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "variations_publish_waits_total",
            "Total waits for a variation to be published",
        ),
        &["result"], // "ready", "published", "timeout", "no_such_job", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(JOBS_CANCELLED.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(PUBLISH_WAITS.clone()),
    ]
}

/// Register every core metric with `registry`.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_once() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        JOBS_ENQUEUED.with_label_values(&["creation:image"]).inc();
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"variations_jobs_enqueued_total".to_string()));

        // A second registration of the same collectors is rejected.
        assert!(register_metrics(&registry).is_err());
    }
}
