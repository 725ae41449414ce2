//! Error types for the database layer.

use crate::migrations::MigrationError;
use crate::query::QueryError;
use crate::schema::SchemaError;
use crate::url::UrlError;

/// Errors surfaced by [`DatabaseManager`](crate::DatabaseManager) and the
/// session helpers.
///
/// Nothing here is retried locally. The only normalization the manager
/// performs is treating a missing bookkeeping table as "no current revision";
/// every other failure arrives here unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The database could not be opened at all.
    #[error("failed to open database: {0}")]
    Connect(#[source] rusqlite::Error),

    /// A pooled connection could not be acquired (pool timeout, or a
    /// connection that failed its init pragmas).
    #[error("failed to acquire database connection: {0}")]
    Pool(#[from] r2d2::Error),

    /// A SQL statement failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The migration engine rejected the scripts or failed to apply them.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The schema registry rejected a table definition.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The database URL could not be understood.
    #[error(transparent)]
    Url(#[from] UrlError),

    /// A query helper failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The blocking worker running a database call panicked or was aborted.
    #[error("database worker failed: {0}")]
    Worker(String),
}

impl DbError {
    /// Whether this error means "the requested record does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::Query(QueryError::NotFound { .. }))
    }
}
