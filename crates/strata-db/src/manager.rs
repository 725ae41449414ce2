//! The blocking database manager.

use std::path::{Path, PathBuf};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;

use crate::config::DatabaseConfig;
use crate::error::DbError;
use crate::migrations::{self, ScriptDirectory, Target, VersionTable, DEFAULT_VERSION_TABLE};
use crate::pool::{create_pool, try_open, DbPool, DbRuntimeSettings};
use crate::schema::{is_identifier, SchemaError, SchemaRegistry};
use crate::session::session_scope;
use crate::status::{classify, reconcile, Action, DatabaseStatus, SyncResult};
use crate::url::DatabaseUrl;

/// Owns the connection pool, the migration script location and the schema
/// registry, and sequences reads and schema changes against them.
///
/// Every operation checks out its own connection and returns it before
/// finishing. `create`, `upgrade`, `stamp` and `drop_all` each run in exactly
/// one transaction, so a failure part-way leaves the schema as it was.
///
/// The script directory is re-read on every call; nothing is cached between
/// operations.
pub struct DatabaseManager {
    url: DatabaseUrl,
    pool: DbPool,
    script_location: PathBuf,
    version_table: String,
    registry: SchemaRegistry,
}

impl DatabaseManager {
    /// Creates a manager with default pool settings and an empty registry.
    ///
    /// No connection is opened here.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Url` if the URL is not a SQLite URL.
    pub fn new(url: &str, script_location: impl Into<PathBuf>) -> Result<Self, DbError> {
        Self::with_settings(url, script_location, DbRuntimeSettings::default())
    }

    /// Creates a manager with explicit pool settings.
    pub fn with_settings(
        url: &str,
        script_location: impl Into<PathBuf>,
        settings: DbRuntimeSettings,
    ) -> Result<Self, DbError> {
        let url = DatabaseUrl::parse(url)?;
        let pool = create_pool(&url, settings);
        Ok(Self {
            url,
            pool,
            script_location: script_location.into(),
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            registry: SchemaRegistry::new(),
        })
    }

    /// Creates a manager from a `[database]` configuration section.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DbError> {
        Self::with_settings(
            &config.url,
            config.migrations_path.clone(),
            config.runtime_settings(),
        )
    }

    /// Replaces the set of model tables this manager creates and drops.
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Uses a different bookkeeping table name.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidIdentifier` for names that are not plain
    /// identifiers.
    pub fn with_version_table(mut self, name: &str) -> Result<Self, DbError> {
        if !is_identifier(name) {
            return Err(SchemaError::InvalidIdentifier(name.to_string()).into());
        }
        self.version_table = name.to_string();
        Ok(self)
    }

    pub fn url(&self) -> &DatabaseUrl {
        &self.url
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn script_location(&self) -> &Path {
        &self.script_location
    }

    fn version_table(&self) -> VersionTable<'_> {
        VersionTable::new(&self.version_table)
    }

    /// Fails with `DbError::Connect` if the pool holds no connection and the
    /// database cannot be opened.
    fn ensure_reachable(&self) -> Result<(), DbError> {
        if self.pool.state().connections == 0 {
            try_open(&self.url).map_err(DbError::Connect)?;
        }
        Ok(())
    }

    /// Checks out a pooled connection.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, DbError> {
        self.ensure_reachable()?;
        Ok(self.pool.get()?)
    }

    /// Reads and validates the migration scripts.
    pub fn scripts(&self) -> Result<ScriptDirectory, DbError> {
        Ok(ScriptDirectory::load(&self.script_location)?)
    }

    /// Runs `f` as one unit of work: commit on success, roll back on failure.
    pub fn session<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        self.ensure_reachable()?;
        session_scope(&self.pool, f)
    }

    /// The revision recorded in the database, or `None` if the bookkeeping
    /// table is missing or does not hold exactly one row.
    ///
    /// # Errors
    ///
    /// Connection failures and any database error other than the missing
    /// table are returned as-is.
    pub fn get_current_revision(&self) -> Result<Option<String>, DbError> {
        let conn = self.connection()?;
        Ok(self.version_table().current(&conn)?)
    }

    /// The newest revision among the migration scripts, or `None` if there
    /// are none.
    pub fn get_latest_revision(&self) -> Result<Option<String>, DbError> {
        let scripts = self.scripts()?;
        Ok(scripts.current_head()?.map(str::to_string))
    }

    /// Every revision that no other script builds on. A linear history has
    /// at most one.
    pub fn heads(&self) -> Result<Vec<String>, DbError> {
        let scripts = self.scripts()?;
        Ok(scripts.heads().into_iter().map(str::to_string).collect())
    }

    /// Creates every registered table and stamps the database at the newest
    /// revision, without replaying any script.
    pub fn create(&self) -> Result<(), DbError> {
        let scripts = self.scripts()?;
        self.session(|tx| {
            self.registry.create_all(tx)?;
            migrations::stamp(tx, &scripts, self.version_table(), &Target::Head)?;
            Ok::<_, DbError>(())
        })?;
        tracing::info!(url = %self.url, "created database schema");
        Ok(())
    }

    /// Applies pending migrations up to `target`. Returns how many scripts
    /// ran.
    pub fn upgrade(&self, target: &Target) -> Result<usize, DbError> {
        let scripts = self.scripts()?;
        let applied = self.session(|tx| {
            Ok::<_, DbError>(migrations::upgrade(
                tx,
                &scripts,
                self.version_table(),
                target,
            )?)
        })?;
        tracing::info!(url = %self.url, %target, applied, "upgraded database schema");
        Ok(applied)
    }

    /// Records `target` as the applied revision without running scripts.
    pub fn stamp(&self, target: &Target) -> Result<Option<String>, DbError> {
        let scripts = self.scripts()?;
        self.session(|tx| {
            Ok::<_, DbError>(migrations::stamp(
                tx,
                &scripts,
                self.version_table(),
                target,
            )?)
        })
    }

    /// Drops every registered table and the bookkeeping table.
    pub fn drop_all(&self) -> Result<(), DbError> {
        self.session(|tx| {
            self.registry.drop_all(tx)?;
            self.version_table().drop_table(tx)?;
            Ok::<_, DbError>(())
        })?;
        tracing::info!(url = %self.url, "dropped database schema");
        Ok(())
    }

    /// Compares the recorded revision with the newest available one.
    pub fn get_status(&self) -> Result<DatabaseStatus, DbError> {
        let current = self.get_current_revision()?;
        let latest = self.get_latest_revision()?;
        Ok(classify(current.as_deref(), latest.as_deref()))
    }

    /// Creates or upgrades the schema as needed.
    ///
    /// An uninitialized database is created from the registry and stamped at
    /// the newest revision; a database behind the newest revision is
    /// upgraded; anything else is left alone.
    pub fn sync(&self) -> Result<SyncResult, DbError> {
        let current = self.get_current_revision()?;
        let latest = self.get_latest_revision()?;
        let action = reconcile(current.as_deref(), latest.as_deref());

        tracing::debug!(
            current = current.as_deref().unwrap_or("<none>"),
            latest = latest.as_deref().unwrap_or("<none>"),
            ?action,
            "reconciling database schema"
        );

        match action {
            Action::CreateAndStamp => self.create()?,
            Action::RunUpgrade => {
                self.upgrade(&Target::Head)?;
            }
            Action::NoOp => {}
        }
        Ok(action.outcome())
    }
}
