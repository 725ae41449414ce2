use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use strata_db::migrations::generate_revision;
use strata_db::{
    exists_in_db, Column, DatabaseConfig, DatabaseManager, DatabaseStatus, DbError,
    MigrationError, SchemaError, SchemaRegistry, SqlType, SyncResult, Table, Target,
};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("should create temp dir");
        fs::create_dir(dir.path().join("migrations")).expect("should create migrations dir");
        Self { dir }
    }

    fn url(&self) -> String {
        format!("sqlite:///{}", self.dir.path().join("app.db").display())
    }

    fn migrations(&self) -> PathBuf {
        self.dir.path().join("migrations")
    }

    fn manager(&self) -> DatabaseManager {
        DatabaseManager::new(&self.url(), self.migrations())
            .expect("should create manager")
            .with_registry(registry())
    }

    fn write_script(&self, revision: &str, down_revision: Option<&str>, sql: &str) {
        write_script(&self.migrations(), revision, down_revision, sql);
    }
}

fn write_script(dir: &Path, revision: &str, down_revision: Option<&str>, sql: &str) {
    let contents = format!(
        "-- revision: {revision}\n-- down_revision: {}\n\n{sql}\n",
        down_revision.unwrap_or("None")
    );
    fs::write(dir.join(format!("{revision}.sql")), contents).expect("should write script");
}

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            Table::new("users")
                .column(Column::new("id", SqlType::Integer).primary_key())
                .column(Column::new("name", SqlType::Text).not_null().unique()),
        )
        .expect("should register users");
    registry
}

fn schema_snapshot(manager: &DatabaseManager) -> Vec<(String, Option<String>)> {
    let conn = manager.connection().expect("should get a connection");
    let mut stmt = conn
        .prepare("SELECT name, sql FROM sqlite_master ORDER BY name")
        .expect("should prepare");
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("should query")
        .collect::<Result<Vec<_>, _>>()
        .expect("should read rows");
    rows
}

fn table_exists(manager: &DatabaseManager, table: &str) -> bool {
    let conn = manager.connection().expect("should get a connection");
    exists_in_db(&conn, table, None).expect("should query sqlite_master")
}

#[test]
fn fresh_database_has_no_revision() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    assert_eq!(manager.get_current_revision().expect("should read"), None);
    assert_eq!(manager.get_latest_revision().expect("should read"), None);
    assert_eq!(
        manager.get_status().expect("should classify"),
        DatabaseStatus::NoInfo
    );
}

#[test]
fn latest_revision_follows_generated_scripts() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let first = generate_revision(&fixture.migrations(), "initial", None)
        .expect("should generate revision");
    assert_eq!(
        manager.get_latest_revision().expect("should read").as_deref(),
        Some(first.revision())
    );

    let second = generate_revision(&fixture.migrations(), "add email", Some("abc123"))
        .expect("should generate revision");
    assert_eq!(second.down_revision(), Some(first.revision()));
    assert_eq!(
        manager.get_latest_revision().expect("should read").as_deref(),
        Some("abc123")
    );
}

#[test]
fn create_stamps_latest_revision() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let script = generate_revision(&fixture.migrations(), "initial", None)
        .expect("should generate revision");

    manager.create().expect("should create");

    assert_eq!(
        manager.get_current_revision().expect("should read"),
        manager.get_latest_revision().expect("should read")
    );
    assert_eq!(
        manager.get_current_revision().expect("should read").as_deref(),
        Some(script.revision())
    );
    assert!(table_exists(&manager, "users"));
}

#[test]
fn create_without_scripts_leaves_no_revision() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    manager.create().expect("should create");

    assert!(table_exists(&manager, "users"));
    assert!(table_exists(&manager, "strata_version"));
    assert_eq!(manager.get_current_revision().expect("should read"), None);
}

#[test]
fn status_tracks_each_step() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script("r1", None, "");

    assert_eq!(manager.get_status().unwrap(), DatabaseStatus::NoInfo);

    manager.create().expect("should create");
    assert_eq!(manager.get_status().unwrap(), DatabaseStatus::UpToDate);

    fixture.write_script("r2", Some("r1"), "ALTER TABLE users ADD COLUMN email TEXT;");
    assert_eq!(
        manager.get_status().unwrap(),
        DatabaseStatus::UpgradeAvailable
    );

    let applied = manager.upgrade(&Target::Head).expect("should upgrade");
    assert_eq!(applied, 1);
    assert_eq!(manager.get_status().unwrap(), DatabaseStatus::UpToDate);
}

#[test]
fn sync_creates_then_upgrades_then_does_nothing() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script("r1", None, "");

    assert_eq!(manager.sync().expect("should sync"), SyncResult::Created);
    assert_eq!(
        manager.sync().expect("should sync"),
        SyncResult::AlreadyUpToDate
    );

    fixture.write_script("r2", Some("r1"), "ALTER TABLE users ADD COLUMN email TEXT;");
    assert_eq!(manager.sync().expect("should sync"), SyncResult::Upgraded);
    assert_eq!(
        manager.sync().expect("should sync"),
        SyncResult::AlreadyUpToDate
    );
}

#[test]
fn drop_removes_tables_and_revision() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script("r1", None, "");
    manager.create().expect("should create");

    manager.drop_all().expect("should drop");

    assert_eq!(manager.get_current_revision().expect("should read"), None);
    assert!(!table_exists(&manager, "users"));
    assert!(!table_exists(&manager, "strata_version"));
    assert_eq!(manager.get_status().unwrap(), DatabaseStatus::NoInfo);
}

#[test]
fn empty_database_with_one_script_is_created() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script(
        "r1",
        None,
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);",
    );

    assert_eq!(manager.sync().expect("should sync"), SyncResult::Created);
    assert_eq!(
        manager.get_current_revision().unwrap().as_deref(),
        Some("r1")
    );
    assert!(table_exists(&manager, "users"));
}

#[test]
fn database_behind_new_script_is_upgraded() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script("r1", None, "");
    manager.create().expect("should create");

    fixture.write_script("r2", Some("r1"), "ALTER TABLE users ADD COLUMN email TEXT;");
    assert_eq!(manager.sync().expect("should sync"), SyncResult::Upgraded);

    assert_eq!(
        manager.get_current_revision().unwrap().as_deref(),
        Some("r2")
    );
    let conn = manager.connection().expect("should get a connection");
    assert!(exists_in_db(&conn, "users", Some("email")).expect("should query"));
}

#[test]
fn current_database_is_left_untouched() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script("r1", None, "");
    fixture.write_script("r2", Some("r1"), "ALTER TABLE users ADD COLUMN email TEXT;");
    manager.create().expect("should create");
    assert_eq!(
        manager.get_current_revision().unwrap().as_deref(),
        Some("r2")
    );

    let before = schema_snapshot(&manager);
    assert_eq!(
        manager.sync().expect("should sync"),
        SyncResult::AlreadyUpToDate
    );
    assert_eq!(schema_snapshot(&manager), before);
    assert_eq!(
        manager.get_current_revision().unwrap().as_deref(),
        Some("r2")
    );
}

#[test]
fn unreachable_database_is_an_error_not_no_info() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let url = format!(
        "sqlite:///{}",
        dir.path().join("missing").join("app.db").display()
    );
    let manager = DatabaseManager::new(&url, dir.path()).expect("should create manager");

    let started = Instant::now();
    let err = manager.get_status().expect_err("status should fail");
    assert!(matches!(err, DbError::Connect(_)), "got {err:?}");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "open failure should not wait for the pool timeout, took {:?}",
        started.elapsed()
    );

    let err = manager.sync().expect_err("sync should fail");
    assert!(matches!(err, DbError::Connect(_)), "got {err:?}");

    let err = manager
        .session(|_tx| -> Result<(), DbError> { Ok(()) })
        .expect_err("session should fail");
    assert!(matches!(err, DbError::Connect(_)), "got {err:?}");
}

#[test]
fn failed_upgrade_rolls_back_every_script() {
    let fixture = Fixture::new();
    let manager = DatabaseManager::new(&fixture.url(), fixture.migrations())
        .expect("should create manager");
    fixture.write_script("r1", None, "CREATE TABLE accounts (id INTEGER PRIMARY KEY);");
    fixture.write_script("r2", Some("r1"), "ALTER TABLE nowhere ADD COLUMN x TEXT;");

    let err = manager
        .upgrade(&Target::Head)
        .expect_err("second script should fail");
    match err {
        DbError::Migration(MigrationError::ExecutionFailed { revision, .. }) => {
            assert_eq!(revision, "r2");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(manager.get_current_revision().unwrap(), None);
    assert!(!table_exists(&manager, "accounts"));
}

#[test]
fn upgrade_to_an_intermediate_revision() {
    let fixture = Fixture::new();
    let manager = DatabaseManager::new(&fixture.url(), fixture.migrations())
        .expect("should create manager");
    fixture.write_script("r1", None, "CREATE TABLE accounts (id INTEGER PRIMARY KEY);");
    fixture.write_script("r2", Some("r1"), "ALTER TABLE accounts ADD COLUMN owner TEXT;");

    let applied = manager
        .upgrade(&"r1".parse().expect("targets always parse"))
        .expect("should upgrade");
    assert_eq!(applied, 1);
    assert_eq!(
        manager.get_status().unwrap(),
        DatabaseStatus::UpgradeAvailable
    );

    let err = manager
        .upgrade(&Target::Revision("r9".to_string()))
        .expect_err("unknown target should fail");
    assert!(matches!(
        err,
        DbError::Migration(MigrationError::UnknownRevision { .. })
    ));
}

#[test]
fn stamp_records_without_running_scripts() {
    let fixture = Fixture::new();
    let manager = DatabaseManager::new(&fixture.url(), fixture.migrations())
        .expect("should create manager");
    fixture.write_script("r1", None, "CREATE TABLE accounts (id INTEGER PRIMARY KEY);");

    let stamped = manager.stamp(&Target::Head).expect("should stamp");
    assert_eq!(stamped.as_deref(), Some("r1"));
    assert_eq!(manager.get_status().unwrap(), DatabaseStatus::UpToDate);
    assert!(!table_exists(&manager, "accounts"));
}

#[test]
fn branched_history_is_an_error() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_script("r1", None, "");
    fixture.write_script("r2a", Some("r1"), "");
    fixture.write_script("r2b", Some("r1"), "");

    let err = manager
        .get_latest_revision()
        .expect_err("two heads should fail");
    assert!(matches!(
        err,
        DbError::Migration(MigrationError::MultipleHeads(_))
    ));
    assert_eq!(
        manager.heads().expect("should list heads"),
        vec!["r2a".to_string(), "r2b".to_string()]
    );
}

#[test]
fn malformed_bookkeeping_table_propagates() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager
        .connection()
        .expect("should get a connection")
        .execute_batch("CREATE TABLE strata_version (something_else TEXT);")
        .expect("should create table");

    let err = manager
        .get_current_revision()
        .expect_err("unexpected table layout should fail");
    assert!(matches!(err, DbError::Database(_)), "got {err:?}");
}

#[test]
fn custom_version_table() {
    let fixture = Fixture::new();
    fixture.write_script("r1", None, "");
    let manager = fixture
        .manager()
        .with_version_table("schema_revision")
        .expect("should accept identifier");

    manager.sync().expect("should sync");

    assert!(table_exists(&manager, "schema_revision"));
    assert!(!table_exists(&manager, "strata_version"));

    let err = fixture
        .manager()
        .with_version_table("bad name")
        .err()
        .expect("should reject identifier");
    assert!(matches!(
        err,
        DbError::Schema(SchemaError::InvalidIdentifier(_))
    ));
}

#[test]
fn manager_from_config() {
    let fixture = Fixture::new();
    fixture.write_script("r1", None, "");
    let config = DatabaseConfig {
        url: fixture.url(),
        migrations_path: fixture.migrations(),
        ..DatabaseConfig::default()
    };

    let manager = DatabaseManager::from_config(&config)
        .expect("should create manager")
        .with_registry(registry());

    assert_eq!(manager.sync().expect("should sync"), SyncResult::Created);
    assert_eq!(manager.script_location(), fixture.migrations());
}

#[test]
fn rejects_other_dialects() {
    let err = DatabaseManager::new("postgresql://localhost/app", "migrations")
        .err()
        .expect("should reject postgres");
    assert!(matches!(err, DbError::Url(_)));
}

#[test]
fn session_commits_and_rolls_back() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager.create().expect("should create");

    manager
        .session(|tx| -> Result<(), DbError> {
            tx.execute("INSERT INTO users (name) VALUES ('alice')", [])?;
            Ok(())
        })
        .expect("should commit");

    let result = manager.session(|tx| -> Result<(), DbError> {
        tx.execute("INSERT INTO users (name) VALUES ('bob')", [])?;
        tx.execute("INSERT INTO users (name) VALUES ('alice')", [])?;
        Ok(())
    });
    assert!(result.is_err(), "duplicate name should fail");

    let names: Vec<String> = {
        let conn = manager.connection().expect("should get a connection");
        let mut stmt = conn
            .prepare("SELECT name FROM users ORDER BY id")
            .expect("should prepare");
        let names = stmt
            .query_map([], |row| row.get(0))
            .expect("should query")
            .collect::<Result<_, _>>()
            .expect("should read rows");
        names
    };
    assert_eq!(names, vec!["alice".to_string()]);
}
