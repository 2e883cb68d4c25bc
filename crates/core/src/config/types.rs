use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::processor::FfmpegConfig;
use crate::worker::WorkerPoolConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerPoolConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where published files live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory; variations are stored under `<root>/<variation>/`.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Marker inserted into temporary file names while a job writes them.
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            temp_suffix: default_temp_suffix(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_temp_suffix() -> String {
    "processing".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("variations.db")
}

/// Job queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Fallback poll interval for idle workers (milliseconds). Workers are
    /// normally woken on enqueue; polling picks up jobs written by other
    /// processes sharing the database.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Return jobs left `active` by a crashed process to `waiting` on startup.
    #[serde(default = "default_recover_on_startup")]
    pub recover_on_startup: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            recover_on_startup: default_recover_on_startup(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_recover_on_startup() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Metrics export
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Prometheus text file rewritten on every stats interval, for a
    /// node_exporter textfile collector.
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.root, PathBuf::from("media"));
        assert_eq!(config.storage.temp_suffix, "processing");
        assert!(config.queue.recover_on_startup);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.metrics.textfile.is_none());
    }

    #[test]
    fn test_deserialize_metrics_textfile() {
        let toml = r#"
[metrics]
textfile = "/var/lib/node_exporter/variations.prom"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.metrics.textfile,
            Some(PathBuf::from("/var/lib/node_exporter/variations.prom"))
        );
    }

    #[test]
    fn test_deserialize_with_custom_database_path() {
        let toml = r#"
[database]
path = "/data/custom.db"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/data/custom.db"));
    }

    #[test]
    fn test_deserialize_unknown_log_format_fails() {
        let toml = r#"
[logging]
format = "xml"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
