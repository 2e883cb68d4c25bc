//! Prometheus metrics for the worker daemon.
//!
//! Core metrics (queues, jobs, publish waits) are registered alongside the
//! pool gauges collected here. The daemon has no HTTP listener, so metrics
//! are exported as a Prometheus text file.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use variations_core::{Pipeline, WorkerPool};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Whether the worker pool is running (1 = running, 0 = stopped).
pub static POOL_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "variations_worker_pool_running",
        "Whether the worker pool is running",
    )
    .unwrap()
});

/// Jobs currently executing, by stage.
pub static POOL_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("variations_worker_active_jobs", "Jobs currently executing"),
        &["stage"],
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry.register(Box::new(POOL_RUNNING.clone())).unwrap();
    registry.register(Box::new(POOL_ACTIVE.clone())).unwrap();

    for metric in variations_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Replace the text file at `path` with the current metrics.
///
/// Written next to the target and renamed, so a scraper never reads a
/// partial file.
pub async fn write_textfile(path: &Path) -> std::io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    tokio::fs::write(&temp, encode_metrics()).await?;
    tokio::fs::rename(&temp, path).await
}

/// Refresh gauges from the pool and the queues.
pub fn collect_dynamic_metrics(pool: &WorkerPool, pipeline: &Pipeline) {
    let status = pool.status();
    POOL_RUNNING.set(if status.running { 1 } else { 0 });
    for stage in &status.pools {
        POOL_ACTIVE
            .with_label_values(&[stage.stage.as_str()])
            .set(stage.active_jobs as i64);
    }
    // Updates the queue depth gauges as a side effect.
    let _ = pipeline.stats();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_core_metrics() {
        variations_core::metrics::JOBS_ENQUEUED
            .with_label_values(&["creation:image"])
            .inc();
        POOL_RUNNING.set(1);
        let output = encode_metrics();
        assert!(output.contains("variations_worker_pool_running 1"));
        assert!(output.contains("variations_jobs_enqueued_total"));
    }

    #[tokio::test]
    async fn test_write_textfile_replaces_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("variations.prom");
        std::fs::write(&path, "stale").unwrap();

        POOL_RUNNING.set(1);
        write_textfile(&path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("variations_worker_pool_running"));
        assert!(!dir.path().join("variations.prom.tmp").exists());
    }
}
