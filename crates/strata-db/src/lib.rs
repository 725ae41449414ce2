//! Database layer for Strata.
//!
//! Ties a registry of model tables to a directory of revisioned SQL
//! migration scripts, and decides from the revision recorded in the
//! database whether its schema has to be created, upgraded, or left alone.
//!
//! # Design decisions
//!
//! - **Create, then stamp**: a database with no recorded revision is built
//!   straight from the schema registry and stamped at the newest revision.
//!   Replaying every script on a fresh database is never done.
//! - **Only a missing bookkeeping table means "no revision"**: any other
//!   failure while reading it, including an unreachable database, is an
//!   error for the caller.
//! - **`r2d2` connection pool, opened lazily**: constructing a manager
//!   never touches the database. Every operation checks out its own
//!   connection and runs its writes in one transaction.
//! - **Blocking core, async wrapper**: [`AsyncDatabaseManager`] hands each
//!   call to tokio's blocking pool instead of duplicating the logic.

mod aio;
mod config;
mod error;
mod helpers;
mod manager;
pub mod migrations;
mod pool;
pub mod query;
mod schema;
mod session;
mod status;
mod url;

pub use aio::AsyncDatabaseManager;
pub use config::DatabaseConfig;
pub use error::DbError;
pub use helpers::{exists_in_db, is_sqlite};
pub use manager::DatabaseManager;
pub use migrations::{MigrationError, Target};
pub use pool::{create_pool, DbPool, DbRuntimeSettings};
pub use query::{Model, QueryError};
pub use schema::{Column, SchemaError, SchemaRegistry, SqlType, Table};
pub use session::session_scope;
pub use status::{classify, reconcile, Action, DatabaseStatus, SyncResult};
pub use url::{DatabaseUrl, UrlError};
