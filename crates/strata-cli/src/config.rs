//! CLI configuration loading from file and environment variables.

use std::path::PathBuf;

use serde::Deserialize;
use strata_db::DatabaseConfig;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "warn", "debug", "strata_db=debug,warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `STRATA_DATABASE_URL` overrides `database.url`
/// - `STRATA_MIGRATIONS_PATH` overrides `database.migrations_path`
/// - `STRATA_LOG_LEVEL` overrides `logging.level`
/// - `STRATA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = read_config(path)?;
    Ok(apply_overrides(config, |key| std::env::var(key).ok()))
}

fn read_config(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::FileRead(e)),
        },
        None => Ok(Config::default()),
    }
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(url) = var("STRATA_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(path) = var("STRATA_MIGRATIONS_PATH") {
        config.database.migrations_path = PathBuf::from(path);
    }
    if let Some(level) = var("STRATA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("STRATA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    config
}
