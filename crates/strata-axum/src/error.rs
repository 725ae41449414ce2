//! HTTP error mapping for database failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::{Connection, ToSql};
use strata_db::{DbError, Model, QueryError};
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Query(err) => err.into(),
            other => {
                tracing::error!(error = %other, "database operation failed");
                ApiError::InternalServerError(other.to_string())
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            other => {
                tracing::error!(error = %other, "query failed");
                ApiError::InternalServerError(other.to_string())
            }
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::from(err).into()
    }
}

/// Looks a record up by primary key, or fails with 404.
///
/// `description` replaces the default "`<table>` not found" message.
pub fn get_or_404<M: Model, K: ToSql>(
    conn: &Connection,
    pk: K,
    description: Option<&str>,
) -> Result<M, ApiError> {
    M::get_by_pk(conn, pk)?.ok_or_else(|| {
        ApiError::NotFound(
            description.map_or_else(|| format!("{} not found", M::TABLE), str::to_string),
        )
    })
}

/// Unwraps a lookup result, or fails with 404.
pub fn first_or_404<T>(value: Option<T>, description: Option<&str>) -> Result<T, ApiError> {
    value.ok_or_else(|| {
        ApiError::NotFound(description.unwrap_or("no matching record").to_string())
    })
}
