mod metrics;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variations_core::config::LogFormat;
use variations_core::{
    load_config, validate_config, ArtifactStore, FfmpegRunner, JobQueueManager, JobStore,
    MetadataRegistry, Pipeline, PipelineContext, ProcessorRegistry, SqliteArtifactStore,
    SqliteJobStore, StorageLayout, VariationCatalog, WorkerPool,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often queue depth is logged and gauges refreshed.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialised yet when configuration fails.
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("VARIATIONS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config = ?config_path,
        config_hash = &config_hash[..16],
        "Configuration loaded"
    );
    info!("Storage root: {:?}", config.storage.root);
    info!("Database path: {:?}", config.database.path);

    let catalog = Arc::new(VariationCatalog::builtin().context("Invalid variation catalog")?);

    let runner = Arc::new(FfmpegRunner::new(config.ffmpeg.clone()));
    if let Err(e) = runner.validate().await {
        warn!("FFmpeg unavailable, video variations will fail: {}", e);
    }
    let processors = Arc::new(ProcessorRegistry::with_defaults(Arc::clone(&runner)));
    let extractors = Arc::new(MetadataRegistry::with_defaults(Arc::clone(&runner)));
    info!("Processors: {:?}", processors.names());

    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to open job store")?,
    );
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(
        SqliteArtifactStore::new(&config.database.path)
            .context("Failed to open artifact store")?,
    );
    let queue = Arc::new(JobQueueManager::new(job_store));

    if config.queue.recover_on_startup {
        let recovered = queue
            .recover_stalled()
            .context("Failed to recover stalled jobs")?;
        info!("Recovered {} stalled jobs", recovered);
    }

    let layout = StorageLayout::new(config.storage.root.clone())
        .with_temp_suffix(config.storage.temp_suffix.clone());
    let ctx = Arc::new(
        PipelineContext::new(catalog, processors, extractors, queue, artifacts, layout)
            .with_source_wait_timeout(config.worker.source_wait_timeout())
            .with_poll_interval(Duration::from_millis(config.queue.poll_interval_ms)),
    );
    let pipeline = Pipeline::new(Arc::clone(&ctx));

    once_cell::sync::Lazy::force(&metrics::REGISTRY);

    let pool = Arc::new(WorkerPool::new(
        ctx,
        config.worker.clone(),
        Duration::from_millis(config.queue.poll_interval_ms),
    ));
    pool.start().await;

    let textfile = config.metrics.textfile.clone();
    if let Some(path) = &textfile {
        info!("Metrics textfile: {:?}", path);
    }

    let reporter = {
        let pool = Arc::clone(&pool);
        let pipeline = pipeline.clone();
        let textfile = textfile.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(STATS_INTERVAL).await;
                metrics::collect_dynamic_metrics(&pool, &pipeline);
                if let Some(path) = &textfile {
                    if let Err(e) = metrics::write_textfile(path).await {
                        warn!("Failed to write metrics to {:?}: {}", path, e);
                    }
                }
                match pipeline.stats() {
                    Ok(stats) => {
                        for s in stats.iter().filter(|s| s.waiting + s.active > 0) {
                            info!(queue = %s.queue, waiting = s.waiting, active = s.active, "Queue depth");
                        }
                    }
                    Err(e) => warn!("Failed to read queue stats: {}", e),
                }
            }
        })
    };

    info!("variationsd {} running", VERSION);
    shutdown_signal().await;
    info!("Shutdown signal received");

    reporter.abort();
    pool.stop().await;

    metrics::collect_dynamic_metrics(&pool, &pipeline);
    if let Some(path) = &textfile {
        if let Err(e) = metrics::write_textfile(path).await {
            warn!("Failed to write final metrics to {:?}: {}", path, e);
        }
    }

    info!("variationsd stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
