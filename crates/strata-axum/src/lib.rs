//! axum integration for Strata.
//!
//! [`Db`] is the shared handle an application puts behind an
//! [`Extension`]; handlers use [`Db::unit_of_work`] to run their database
//! work as one transaction on a blocking worker. Failures convert into
//! [`ApiError`], which renders as `{"error": "..."}` with a 404 for missing
//! records and a 500 for everything else.
//!
//! [`router`] serves the built-in routes:
//!
//! - `GET /health`
//! - `GET /db/status`: the recorded and newest revisions and how they
//!   compare.

mod error;

use axum::{routing::get, Extension, Json, Router};
use rusqlite::Transaction;
use serde::Serialize;
use serde_json::{json, Value};
use strata_db::{classify, AsyncDatabaseManager, DatabaseManager, DatabaseStatus};
use tower_http::trace::TraceLayer;

pub use error::{first_or_404, get_or_404, ApiError};

/// Shared database handle for request handlers. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    manager: AsyncDatabaseManager,
}

impl From<AsyncDatabaseManager> for Db {
    fn from(manager: AsyncDatabaseManager) -> Self {
        Self { manager }
    }
}

impl From<DatabaseManager> for Db {
    fn from(manager: DatabaseManager) -> Self {
        Self {
            manager: manager.into(),
        }
    }
}

impl Db {
    pub fn manager(&self) -> &AsyncDatabaseManager {
        &self.manager
    }

    /// Runs `f` in its own transaction on a blocking worker.
    ///
    /// The transaction commits if `f` succeeds and is rolled back otherwise;
    /// either way the connection goes back to the pool before this returns.
    pub async fn unit_of_work<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        self.manager.session(f).await
    }
}

/// Response body for `GET /db/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: DatabaseStatus,
    pub current: Option<String>,
    pub latest: Option<String>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `GET /db/status`.
async fn status_handler(Extension(db): Extension<Db>) -> Result<Json<StatusResponse>, ApiError> {
    let current = db.manager().get_current_revision().await?;
    let latest = db.manager().get_latest_revision().await?;
    let status = classify(current.as_deref(), latest.as_deref());

    Ok(Json(StatusResponse {
        status,
        current,
        latest,
    }))
}

/// Builds the router serving the health and schema-status routes.
///
/// Routes merged in afterwards are not covered by the [`Db`] extension
/// layer added here and need their own `Extension(db)`.
pub fn router(db: Db) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/db/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(db))
}
