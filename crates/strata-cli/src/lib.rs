//! The `strata` command-line tool.
//!
//! `strata db sync` creates or upgrades the configured database and prints
//! exactly one of:
//!
//! ```text
//! Database created.
//! Database upgraded.
//! Database already up-to-date.
//! ```
//!
//! Applications that register model tables build their own binary around
//! [`run`], passing their [`SchemaRegistry`]; the stock `strata` binary
//! runs with an empty registry.

pub mod config;

use std::io::Write;

use clap::{Parser, Subcommand};
use strata_db::migrations::{self, MigrationError};
use strata_db::{AsyncDatabaseManager, DatabaseManager, DbError, SchemaRegistry, Target};
use thiserror::Error;

use crate::config::{Config, ConfigError};

/// Configuration file used when neither `--config` nor
/// `STRATA_CONFIG_PATH` names one.
pub const DEFAULT_CONFIG_PATH: &str = "strata.toml";

/// Strata - database schema creation and migration
#[derive(Parser, Debug)]
#[command(name = "strata", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Database operations
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum DbCommand {
    /// Create or migrate the database
    Sync,
    /// Show whether the database is up-to-date
    Status,
    /// Create all tables and stamp the newest revision
    Create,
    /// Apply pending migrations
    Upgrade {
        /// Revision to upgrade to
        #[arg(long, default_value = "head")]
        target: Target,
    },
    /// Drop all tables, including the revision table
    Drop,
    /// Print the revision recorded in the database
    Current,
    /// Print every head revision, one per line
    Heads,
    /// Write a new, empty migration script
    Revision {
        /// Short description of the change
        #[arg(short, long)]
        message: String,

        /// Revision id to use instead of a random one
        #[arg(long)]
        rev_id: Option<String>,
    },
    /// Record a revision without running any migration
    Stamp {
        /// Revision to record, or "head"
        target: Target,
    },
}

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Picks the configuration file: the `--config` flag, then
/// `STRATA_CONFIG_PATH`, then nothing (the caller falls back to
/// [`DEFAULT_CONFIG_PATH`]). Also returns where the path came from.
pub fn resolve_config_path(cli_arg: Option<&str>) -> (Option<String>, &'static str) {
    if let Some(path) = cli_arg.filter(|value| !value.trim().is_empty()) {
        return (Some(path.to_string()), "cli-arg");
    }

    if let Ok(path) = std::env::var("STRATA_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Runs one command against the configured database, writing its output
/// to `out`.
///
/// # Errors
///
/// Returns `CliError` for any failure; nothing is written to `out` in that
/// case beyond what earlier steps already printed.
pub async fn run<W: Write>(
    command: Command,
    config: &Config,
    registry: SchemaRegistry,
    out: &mut W,
) -> Result<(), CliError> {
    let Command::Db(command) = command;
    tracing::debug!(?command, "running database command");

    match command {
        DbCommand::Sync => {
            let result = open(config, registry)?.sync().await?;
            writeln!(out, "{result}")?;
        }
        DbCommand::Status => {
            let status = open(config, registry)?.get_status().await?;
            writeln!(out, "{status}")?;
        }
        DbCommand::Create => {
            open(config, registry)?.create().await?;
            writeln!(out, "Database created.")?;
        }
        DbCommand::Upgrade { target } => {
            let applied = open(config, registry)?.upgrade(target).await?;
            writeln!(out, "Applied {applied} migration(s).")?;
        }
        DbCommand::Drop => {
            open(config, registry)?.drop_all().await?;
            writeln!(out, "Database dropped.")?;
        }
        DbCommand::Current => {
            let current = open(config, registry)?.get_current_revision().await?;
            writeln!(out, "{}", current.as_deref().unwrap_or("None"))?;
        }
        DbCommand::Heads => {
            for head in open(config, registry)?.heads().await? {
                writeln!(out, "{head}")?;
            }
        }
        DbCommand::Revision { message, rev_id } => {
            let script = migrations::generate_revision(
                &config.database.migrations_path,
                &message,
                rev_id.as_deref(),
            )?;
            writeln!(
                out,
                "Generated {} ({})",
                script.path().display(),
                script.revision()
            )?;
        }
        DbCommand::Stamp { target } => {
            let stamped = open(config, registry)?.stamp(target).await?;
            writeln!(out, "Stamped {}", stamped.as_deref().unwrap_or("None"))?;
        }
    }
    Ok(())
}

fn open(config: &Config, registry: SchemaRegistry) -> Result<AsyncDatabaseManager, CliError> {
    let manager = DatabaseManager::from_config(&config.database)?.with_registry(registry);
    tracing::debug!(
        url = %manager.url(),
        migrations = %manager.script_location().display(),
        "opened database manager"
    );
    Ok(manager.into())
}
