//! Database configuration as it appears in application config files.

use std::path::PathBuf;

use serde::Deserialize;

use crate::pool::DbRuntimeSettings;

/// The `[database]` section of an application's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (`sqlite:///app.db`, `sqlite://` for in-memory).
    #[serde(default = "default_url")]
    pub url: String,

    /// Directory holding the migration scripts.
    #[serde(default = "default_migrations_path")]
    pub migrations_path: PathBuf,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// How long to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_url() -> String {
    "sqlite:///:memory:".to_string()
}

fn default_migrations_path() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_connect_timeout_ms() -> u64 {
    DbRuntimeSettings::default().connect_timeout_ms
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            migrations_path: default_migrations_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// The pool tunables carried by this configuration.
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}
