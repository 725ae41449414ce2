//! The bookkeeping table recording the applied revision.

use rusqlite::Connection;

use crate::schema::quote;

/// Default name of the bookkeeping table.
pub const DEFAULT_VERSION_TABLE: &str = "strata_version";

/// Handle on the single-row bookkeeping table.
#[derive(Debug, Clone, Copy)]
pub struct VersionTable<'a> {
    name: &'a str,
}

impl<'a> VersionTable<'a> {
    /// Wraps a table name. The name must already be a valid identifier.
    pub fn new(name: &'a str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Whether the bookkeeping table exists.
    pub fn exists(&self, conn: &Connection) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [self.name],
            |row| row.get(0),
        )
    }

    /// Reads the applied revision.
    ///
    /// A missing table, an empty table and a table holding more than one row
    /// all read as `None`. Any other failure is returned.
    pub fn current(&self, conn: &Connection) -> rusqlite::Result<Option<String>> {
        if !self.exists(conn)? {
            return Ok(None);
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT version_num FROM {} LIMIT 2",
            quote(self.name)
        ))?;
        let versions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        match versions.as_slice() {
            [only] => Ok(Some(only.clone())),
            _ => Ok(None),
        }
    }

    /// Creates the table if it does not exist.
    pub fn ensure(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version_num TEXT NOT NULL,
                CONSTRAINT {} PRIMARY KEY (version_num)
            );",
            quote(self.name),
            quote(&format!("{}_pkc", self.name))
        ))
    }

    /// Replaces the recorded revision without running any script.
    ///
    /// Stamping `None` leaves the table present but empty.
    pub fn stamp(&self, conn: &Connection, revision: Option<&str>) -> rusqlite::Result<()> {
        self.ensure(conn)?;
        conn.execute(&format!("DELETE FROM {}", quote(self.name)), [])?;
        if let Some(revision) = revision {
            conn.execute(
                &format!("INSERT INTO {} (version_num) VALUES (?1)", quote(self.name)),
                [revision],
            )?;
        }
        Ok(())
    }

    /// Drops the table if it exists.
    pub fn drop_table(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(self.name)))
    }
}
