use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - at least one creation worker per queue
/// - non-zero poll interval, ffmpeg timeout and source wait timeout
/// - a non-empty temporary file marker
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.worker.creation_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "worker.creation_concurrency cannot be 0".to_string(),
        ));
    }

    if config.worker.optimization_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "worker.optimization_concurrency cannot be 0".to_string(),
        ));
    }

    if config.worker.source_wait_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "worker.source_wait_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.queue.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "queue.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.ffmpeg.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "ffmpeg.timeout_secs cannot be 0".to_string(),
        ));
    }

    let suffix = config.storage.temp_suffix.trim();
    if suffix.is_empty() || suffix.contains(std::path::MAIN_SEPARATOR) {
        return Err(ConfigError::ValidationError(
            "storage.temp_suffix must be a non-empty file name fragment".to_string(),
        ));
    }

    Ok(())
}
