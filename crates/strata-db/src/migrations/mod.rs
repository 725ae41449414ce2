//! File-based migration engine.
//!
//! Migration scripts live in a directory as `.sql` files forming a single
//! chain of revisions (see [`Script`] for the file format). The engine reads
//! the chain, works out which scripts lie between the revision recorded in
//! the bookkeeping table and a target, and applies them in order.
//!
//! The functions here run against a connection supplied by the caller and
//! never open transactions themselves; the
//! [`DatabaseManager`](crate::DatabaseManager) wraps each call in exactly one.

mod script;
mod version;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::Connection;
use thiserror::Error;

pub use script::{Script, ScriptDirectory};
pub use version::{VersionTable, DEFAULT_VERSION_TABLE};

/// Errors that can occur while reading or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The script directory could not be listed.
    #[error("failed to read migration directory {path}: {source}")]
    ScriptDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A script file could not be read.
    #[error("failed to read migration script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A new script file could not be written.
    #[error("failed to write migration script {path}: {source}")]
    ScriptWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A script's header is unusable.
    #[error("malformed migration script {path}: {reason}")]
    MalformedScript { path: PathBuf, reason: String },

    /// Two scripts declare the same revision id.
    #[error("revision '{revision}' is declared by both {first} and {second}")]
    DuplicateRevision {
        revision: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A revision is referenced (by a script, the database, or a caller) but
    /// no script declares it.
    #[error("unknown revision '{revision}'")]
    UnknownRevision { revision: String },

    /// The history branches, so there is no single newest revision.
    #[error("multiple head revisions: {}", .0.join(", "))]
    MultipleHeads(Vec<String>),

    /// More than one script claims to be the first revision.
    #[error("multiple root revisions: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    /// Following `down_revision` links never reaches the root.
    #[error("revision '{revision}' is part of a cycle")]
    CyclicRevisions { revision: String },

    /// The target does not build on the current revision.
    #[error(
        "cannot upgrade from {} to {}: target does not descend from the current revision",
        display_revision(.from),
        display_revision(.to)
    )]
    NotAnAncestor {
        from: Option<String>,
        to: Option<String>,
    },

    /// A script failed while executing.
    #[error("migration '{revision}' failed: {source}")]
    ExecutionFailed {
        /// The revision that failed.
        revision: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to read or write the bookkeeping table.
    #[error("failed to access migration state: {0}")]
    StateQuery(#[source] rusqlite::Error),
}

fn display_revision(revision: &Option<String>) -> &str {
    revision.as_deref().unwrap_or("<base>")
}

/// The revision an upgrade or stamp should end at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Target {
    /// The newest revision in the script directory.
    #[default]
    Head,
    /// A specific revision.
    Revision(String),
}

impl FromStr for Target {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "head" | "heads" => Self::Head,
            other => Self::Revision(other.to_string()),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Revision(revision) => f.write_str(revision),
        }
    }
}

/// Applies every script between the recorded revision and `target`.
///
/// Returns the number of scripts applied. The bookkeeping row is moved
/// forward after each script so that it always names the last applied one.
///
/// # Errors
///
/// Returns `MigrationError` if the target cannot be resolved, the database
/// is not on the target's history, or a script fails.
pub fn upgrade(
    conn: &Connection,
    scripts: &ScriptDirectory,
    version_table: VersionTable<'_>,
    target: &Target,
) -> Result<usize, MigrationError> {
    let current = version_table
        .current(conn)
        .map_err(MigrationError::StateQuery)?;
    let to = scripts.resolve(target)?;
    let path = scripts.upgrade_path(current.as_deref(), to)?;

    if path.is_empty() {
        tracing::debug!(
            revision = current.as_deref().unwrap_or("<base>"),
            "database already at target revision"
        );
        return Ok(0);
    }

    for script in &path {
        tracing::info!(
            revision = script.revision(),
            down_revision = script.down_revision().unwrap_or("<base>"),
            "applying migration"
        );

        if script.has_statements() {
            conn.execute_batch(script.sql())
                .map_err(|e| MigrationError::ExecutionFailed {
                    revision: script.revision().to_string(),
                    source: e,
                })?;
        }

        version_table
            .stamp(conn, Some(script.revision()))
            .map_err(|e| MigrationError::ExecutionFailed {
                revision: script.revision().to_string(),
                source: e,
            })?;
    }

    Ok(path.len())
}

/// Records `target` as the applied revision without running any script.
///
/// Returns the revision stamped; `None` when the directory has no scripts,
/// in which case the bookkeeping table is created but left empty.
pub fn stamp(
    conn: &Connection,
    scripts: &ScriptDirectory,
    version_table: VersionTable<'_>,
    target: &Target,
) -> Result<Option<String>, MigrationError> {
    let revision = scripts.resolve(target)?.map(str::to_string);
    version_table
        .stamp(conn, revision.as_deref())
        .map_err(MigrationError::StateQuery)?;
    tracing::info!(
        revision = revision.as_deref().unwrap_or("<base>"),
        "stamped database revision"
    );
    Ok(revision)
}

/// Writes a new, empty migration script on top of the current head.
///
/// A random 12-character hex id is used when `rev_id` is `None`. The
/// directory is created if needed.
///
/// # Errors
///
/// Returns `MigrationError` if the existing scripts are invalid, the
/// history branches, the id is already taken, or the file cannot be written.
pub fn generate_revision(
    location: &Path,
    message: &str,
    rev_id: Option<&str>,
) -> Result<Script, MigrationError> {
    fs::create_dir_all(location).map_err(|source| MigrationError::ScriptDirectory {
        path: location.to_path_buf(),
        source,
    })?;
    let scripts = ScriptDirectory::load(location)?;
    let down_revision = scripts.current_head()?.map(str::to_string);

    let revision = match rev_id {
        Some(id) => id.trim().to_string(),
        None => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            id[id.len() - 12..].to_string()
        }
    };
    if let Some(existing) = scripts.get(&revision) {
        return Err(MigrationError::DuplicateRevision {
            revision,
            first: existing.path().to_path_buf(),
            second: location.to_path_buf(),
        });
    }

    let slug = slugify(message);
    let file_name = if slug.is_empty() {
        format!("{revision}.sql")
    } else {
        format!("{revision}_{slug}.sql")
    };
    let path = location.join(file_name);

    let contents = format!(
        "-- revision: {revision}\n\
         -- down_revision: {}\n\
         -- message: {}\n\
         -- create_date: {}\n\n",
        down_revision.as_deref().unwrap_or("None"),
        message.trim(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
    );
    let script = Script::parse(&path, &contents)?;

    fs::write(&path, &contents).map_err(|source| MigrationError::ScriptWrite {
        path: path.clone(),
        source,
    })?;
    tracing::info!(revision = %revision, path = %path.display(), "generated migration script");

    Ok(script)
}

fn slugify(message: &str) -> String {
    let mut slug = String::new();
    for c in message.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
        if slug.len() >= 40 {
            break;
        }
    }
    slug.trim_end_matches('_').to_string()
}
