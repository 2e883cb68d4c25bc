use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment prefix for overrides, e.g. `VARIATIONS_WORKER__CREATION_CONCURRENCY=4`.
const ENV_PREFIX: &str = "VARIATIONS_";

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are separated by a double underscore so that field names
/// containing underscores survive the split.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[storage]
root = "/srv/media"

[worker]
creation_concurrency = 6
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.storage.root.to_str(), Some("/srv/media"));
        assert_eq!(config.worker.creation_concurrency, 6);
        assert_eq!(config.worker.optimization_concurrency, 1);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.database.path.to_str(), Some("variations.db"));
        assert_eq!(config.queue.poll_interval_ms, 1000);
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[worker]
creation_concurrency = "lots"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/variations.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[database]
path = "/var/lib/variations/queue.db"

[ffmpeg]
timeout_secs = 120

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.database.path.to_str(),
            Some("/var/lib/variations/queue.db")
        );
        assert_eq!(config.ffmpeg.timeout_secs, 120);
        assert_eq!(config.logging.format, crate::config::LogFormat::Json);
    }
}
