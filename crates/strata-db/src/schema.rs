//! Model table definitions and the schema registry.
//!
//! Applications describe their tables with [`Table`] and [`Column`] and
//! collect them in a [`SchemaRegistry`] that is handed to the
//! [`DatabaseManager`](crate::DatabaseManager) at construction time. The
//! registry is what `create()` materializes and what `drop_all()` removes.
//!
//! Constraint and index names follow a fixed convention so that migration
//! scripts can refer to them predictably:
//!
//! | Kind | Name |
//! |------|------|
//! | primary key | `pk_<table>` |
//! | unique | `uq_<table>_<column>` |
//! | index | `ix_<table>_<column>` |
//! | foreign key | `fk_<table>_<column>_<referred table>` |

use rusqlite::Connection;

/// Errors raised when registering table definitions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A table or column name is not a plain SQL identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// A table with this name is already registered.
    #[error("table '{0}' is already registered")]
    DuplicateTable(String),

    /// A column name appears twice in one table.
    #[error("column '{column}' is defined twice in table '{table}'")]
    DuplicateColumn {
        /// The table being registered.
        table: String,
        /// The repeated column.
        column: String,
    },

    /// A table was registered without any columns.
    #[error("table '{0}' has no columns")]
    EmptyTable(String),
}

/// Column storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Timestamp,
}

impl SqlType {
    /// The type name emitted in DDL.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    sql_type: SqlType,
    primary_key: bool,
    nullable: bool,
    unique: bool,
    index: bool,
    default: Option<String>,
    references: Option<(String, String)>,
}

impl Column {
    /// A nullable column with no constraints.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
            nullable: true,
            unique: false,
            index: false,
            default: None,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Sets a default, given as a raw SQL expression (`'x'`, `0`,
    /// `CURRENT_TIMESTAMP`).
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Adds a foreign key to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some((table.into(), column.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if !is_identifier(&self.name) {
            return Err(SchemaError::InvalidIdentifier(self.name.clone()));
        }
        if self.columns.is_empty() {
            return Err(SchemaError::EmptyTable(self.name.clone()));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if !is_identifier(&column.name) {
                return Err(SchemaError::InvalidIdentifier(column.name.clone()));
            }
            if let Some((table, referred)) = &column.references {
                for name in [table, referred] {
                    if !is_identifier(name) {
                        return Err(SchemaError::InvalidIdentifier(name.clone()));
                    }
                }
            }
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Renders the `CREATE TABLE` statement followed by one `CREATE INDEX`
    /// per indexed column. All statements are `IF NOT EXISTS`.
    pub fn create_statements(&self) -> Vec<String> {
        let table = &self.name;
        let pk: Vec<&Column> = self.columns.iter().filter(|c| c.primary_key).collect();
        // A lone INTEGER primary key becomes the rowid alias; NOT NULL on it
        // would only get in the way of automatic id assignment.
        let rowid_alias = pk.len() == 1 && pk[0].sql_type == SqlType::Integer;

        let mut lines = Vec::new();
        for column in &self.columns {
            let mut line = format!("    {} {}", quote(&column.name), column.sql_type.as_sql());
            if !column.nullable && !(column.primary_key && rowid_alias) {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                line.push_str(" DEFAULT ");
                line.push_str(default);
            }
            lines.push(line);
        }

        if !pk.is_empty() {
            let names: Vec<String> = pk.iter().map(|c| quote(&c.name)).collect();
            lines.push(format!(
                "    CONSTRAINT {} PRIMARY KEY ({})",
                quote(&format!("pk_{table}")),
                names.join(", ")
            ));
        }
        for column in self.columns.iter().filter(|c| c.unique) {
            lines.push(format!(
                "    CONSTRAINT {} UNIQUE ({})",
                quote(&format!("uq_{table}_{}", column.name)),
                quote(&column.name)
            ));
        }
        for column in &self.columns {
            if let Some((referred_table, referred_column)) = &column.references {
                lines.push(format!(
                    "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                    quote(&format!("fk_{table}_{}_{referred_table}", column.name)),
                    quote(&column.name),
                    quote(referred_table),
                    quote(referred_column)
                ));
            }
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote(table),
            lines.join(",\n")
        )];
        for column in self.columns.iter().filter(|c| c.index) {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote(&format!("ix_{table}_{}", column.name)),
                quote(table),
                quote(&column.name)
            ));
        }
        statements
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote(&self.name))
    }
}

/// The set of tables an application manages.
///
/// Created once per application (or per test) and passed to the manager.
/// Tables are created in registration order and dropped in reverse, so
/// register referenced tables before the tables that point at them.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: Vec<Table>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table definition.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if a name is not a valid identifier, the table
    /// has no columns or repeats a column, or the table is already
    /// registered.
    pub fn register(&mut self, table: Table) -> Result<&mut Self, SchemaError> {
        table.validate()?;
        if self.table(table.name()).is_some() {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        self.tables.push(table);
        Ok(self)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Forgets every registered table.
    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Creates every registered table and index that does not exist yet.
    pub fn create_all(&self, conn: &Connection) -> Result<(), rusqlite::Error> {
        for table in &self.tables {
            for statement in table.create_statements() {
                conn.execute_batch(&statement)?;
            }
            tracing::debug!(table = table.name(), "created table");
        }
        Ok(())
    }

    /// Drops every registered table, in reverse registration order.
    pub fn drop_all(&self, conn: &Connection) -> Result<(), rusqlite::Error> {
        for table in self.tables.iter().rev() {
            conn.execute_batch(&table.drop_statement())?;
            tracing::debug!(table = table.name(), "dropped table");
        }
        Ok(())
    }
}

/// Whether `name` is a plain identifier: ASCII letters, digits and
/// underscores, not starting with a digit.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quotes an identifier that already passed [`is_identifier`].
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}
