//! Non-blocking wrapper around [`DatabaseManager`].
//!
//! SQLite calls and script-directory reads block, so every operation is
//! handed to tokio's blocking pool and awaited. Each call runs start to
//! finish on one worker; `sync` and `get_status` therefore still read the
//! current revision before deciding anything.

use std::sync::Arc;

use rusqlite::Transaction;

use crate::error::DbError;
use crate::manager::DatabaseManager;
use crate::migrations::Target;
use crate::status::{DatabaseStatus, SyncResult};

/// Async handle on a [`DatabaseManager`]. Cheap to clone.
#[derive(Clone)]
pub struct AsyncDatabaseManager {
    inner: Arc<DatabaseManager>,
}

impl From<DatabaseManager> for AsyncDatabaseManager {
    fn from(manager: DatabaseManager) -> Self {
        Self::new(manager)
    }
}

impl AsyncDatabaseManager {
    pub fn new(manager: DatabaseManager) -> Self {
        Self {
            inner: Arc::new(manager),
        }
    }

    /// The wrapped blocking manager.
    pub fn blocking(&self) -> &DatabaseManager {
        &self.inner
    }

    async fn run<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&DatabaseManager) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let manager = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&manager))
            .await
            .map_err(|e| DbError::Worker(e.to_string()))?
    }

    pub async fn get_current_revision(&self) -> Result<Option<String>, DbError> {
        self.run(|m| m.get_current_revision()).await
    }

    pub async fn get_latest_revision(&self) -> Result<Option<String>, DbError> {
        self.run(|m| m.get_latest_revision()).await
    }

    pub async fn heads(&self) -> Result<Vec<String>, DbError> {
        self.run(|m| m.heads()).await
    }

    pub async fn create(&self) -> Result<(), DbError> {
        self.run(|m| m.create()).await
    }

    pub async fn upgrade(&self, target: Target) -> Result<usize, DbError> {
        self.run(move |m| m.upgrade(&target)).await
    }

    pub async fn stamp(&self, target: Target) -> Result<Option<String>, DbError> {
        self.run(move |m| m.stamp(&target)).await
    }

    pub async fn drop_all(&self) -> Result<(), DbError> {
        self.run(|m| m.drop_all()).await
    }

    pub async fn get_status(&self) -> Result<DatabaseStatus, DbError> {
        self.run(|m| m.get_status()).await
    }

    pub async fn sync(&self) -> Result<SyncResult, DbError> {
        self.run(|m| m.sync()).await
    }

    /// Runs `f` as one unit of work on a blocking worker: commit on success,
    /// roll back and propagate on failure, release the connection always.
    pub async fn session<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let manager = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || manager.session(f))
            .await
            .map_err(|e| E::from(DbError::Worker(e.to_string())))?
    }
}
