//! Schema checks for code that runs whether or not a given migration has
//! been applied.

use rusqlite::{Connection, OptionalExtension};

use crate::url::dialect;

/// Whether `table` exists, or, when `column` is given, whether `table` has
/// that column.
pub fn exists_in_db(
    conn: &Connection,
    table: &str,
    column: Option<&str>,
) -> rusqlite::Result<bool> {
    let found = match column {
        None => conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |_| Ok(()),
            )
            .optional()?,
        Some(column) => conn
            .query_row(
                "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
                [table, column],
                |_| Ok(()),
            )
            .optional()?,
    };
    Ok(found.is_some())
}

/// Whether `url` points at a SQLite database.
pub fn is_sqlite(url: &str) -> bool {
    dialect(url) == "sqlite"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("should open database");
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);")
            .expect("should create table");
        conn
    }

    #[test]
    fn finds_tables() {
        let conn = conn();
        assert!(exists_in_db(&conn, "users", None).expect("should query"));
        assert!(!exists_in_db(&conn, "accounts", None).expect("should query"));
    }

    #[test]
    fn finds_columns() {
        let conn = conn();
        assert!(exists_in_db(&conn, "users", Some("name")).expect("should query"));
        assert!(!exists_in_db(&conn, "users", Some("email")).expect("should query"));
        assert!(!exists_in_db(&conn, "accounts", Some("name")).expect("should query"));
    }

    #[test]
    fn indexes_are_not_tables() {
        let conn = conn();
        conn.execute_batch("CREATE INDEX ix_users_name ON users (name);")
            .expect("should create index");
        assert!(!exists_in_db(&conn, "ix_users_name", None).expect("should query"));
    }

    #[test]
    fn recognizes_sqlite_urls() {
        assert!(is_sqlite("sqlite:///app.db"));
        assert!(is_sqlite("sqlite+pysqlite:///app.db"));
        assert!(is_sqlite("sqlite://"));
        assert!(is_sqlite("app.db"));
        assert!(!is_sqlite("postgresql://localhost/app"));
        assert!(!is_sqlite("mysql+pymysql://localhost/app"));
    }
}
