//! Connection pool creation and configuration.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::url::DatabaseUrl;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,

    /// How long to wait for a pooled connection before giving up, in
    /// milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            connect_timeout_ms: 30_000,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Creates a new SQLite connection pool with WAL mode and foreign keys enabled.
///
/// The pool is built lazily: no connection is opened until the first
/// checkout, so an unreachable database surfaces as an error from the first
/// operation rather than from construction.
///
/// In-memory databases live only as long as their connection, so they get a
/// single connection that is never reaped.
pub fn create_pool(url: &DatabaseUrl, settings: DbRuntimeSettings) -> DbPool {
    let manager = match url {
        DatabaseUrl::Memory => SqliteConnectionManager::memory(),
        DatabaseUrl::File(path) => SqliteConnectionManager::file(path),
    };

    let manager = manager.with_flags(open_flags()).with_init(move |conn| {
        // Set WAL mode and verify it was accepted. In-memory databases
        // report "memory" which is expected and acceptable.
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!(
                    "failed to set WAL journal mode, got: {}",
                    journal_mode
                )),
            ));
        }
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            settings.busy_timeout_ms
        ))
    });

    let builder: r2d2::Builder<SqliteConnectionManager> = Pool::builder()
        .min_idle(Some(0))
        .connection_timeout(Duration::from_millis(settings.connect_timeout_ms));

    let builder = if url.is_memory() {
        builder.max_size(1).idle_timeout(None).max_lifetime(None)
    } else {
        builder.max_size(settings.pool_max_size)
    };

    tracing::debug!(%url, "creating database connection pool");
    builder.build_unchecked(manager)
}

fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX
}

/// Opens and closes one connection outside the pool.
///
/// r2d2 retries a failing connect until the checkout timeout runs out.
/// Opening the file directly while the pool is empty reports an unopenable
/// database on first use instead.
pub(crate) fn try_open(url: &DatabaseUrl) -> rusqlite::Result<()> {
    match url {
        DatabaseUrl::Memory => Ok(()),
        DatabaseUrl::File(path) => Connection::open_with_flags(path, open_flags()).map(drop),
    }
}
