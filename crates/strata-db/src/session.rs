//! Scoped units of work.
//!
//! [`session_scope`] is the one place connections are checked out for
//! writes: the connection goes back to the pool on every exit path, the
//! transaction commits only when the closure succeeds, and is rolled back
//! otherwise (including on panic, via `Transaction`'s drop).

use rusqlite::Transaction;

use crate::error::DbError;
use crate::pool::DbPool;

/// Runs `f` inside a transaction on a pooled connection.
///
/// # Errors
///
/// Returns the closure's error after rolling back, or a `DbError` (converted
/// into `E`) if the connection, the transaction, or the commit fails.
pub fn session_scope<T, E, F>(pool: &DbPool, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    let mut conn = pool.get().map_err(DbError::from)?;
    let tx = conn.transaction().map_err(DbError::from)?;

    match f(&tx) {
        Ok(value) => {
            tx.commit().map_err(DbError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!("failed to roll back transaction: {}", rollback_err);
            }
            Err(err)
        }
    }
}
