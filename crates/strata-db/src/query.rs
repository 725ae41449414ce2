//! Generic lookup helpers for model types.
//!
//! A model is any type that knows its table and can be built from a row.
//! Lookups take attribute filters as `(column, value)` pairs; column names
//! must be plain identifiers and values are always bound as parameters.
//! A `NULL` filter value matches with `IS NULL`.
//!
//! ```rust,ignore
//! let (user, created) = User::get_or_create(&tx, &[("name", Value::from("dummy".to_string()))])?;
//! let same = User::get_by_pk(&tx, user.id)?;
//! ```

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, ToSql};

use crate::schema::{is_identifier, quote};

/// A column filter or assignment.
pub type Attr<'a> = (&'a str, Value);

/// Errors returned by the query helpers.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Exactly one row was required and none matched.
    #[error("no {table} record matches the given attributes")]
    NotFound { table: &'static str },

    /// Exactly one row was required and several matched.
    #[error("more than one {table} record matches the given attributes")]
    MultipleResults { table: &'static str },

    /// A column name is not a plain identifier.
    #[error("invalid column name '{0}'")]
    InvalidIdentifier(String),

    /// The underlying query failed.
    #[error("query failed: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A type stored in one table of the schema registry.
///
/// The provided methods forward to the free functions in this module, so
/// `User::get_or_create(conn, attrs)` and
/// `query::get_or_create::<User>(conn, attrs)` are equivalent.
pub trait Model: Sized {
    /// Table the model lives in.
    const TABLE: &'static str;

    /// Primary key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Builds a model from a `SELECT *` row.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn get_by_pk<K: ToSql>(conn: &Connection, pk: K) -> Result<Option<Self>, QueryError> {
        get_by_pk::<Self, K>(conn, pk)
    }

    fn get_one(conn: &Connection, attrs: &[Attr<'_>]) -> Result<Self, QueryError> {
        get_one::<Self>(conn, attrs)
    }

    fn first(conn: &Connection, attrs: &[Attr<'_>]) -> Result<Option<Self>, QueryError> {
        first::<Self>(conn, attrs)
    }

    fn get_or_create(conn: &Connection, attrs: &[Attr<'_>]) -> Result<(Self, bool), QueryError> {
        get_or_create::<Self>(conn, attrs)
    }

    fn update_or_create(
        conn: &Connection,
        lookup: &[Attr<'_>],
        defaults: &[Attr<'_>],
        create_defaults: Option<&[Attr<'_>]>,
    ) -> Result<(Self, bool), QueryError> {
        update_or_create::<Self>(conn, lookup, defaults, create_defaults)
    }
}

/// Fetches a model by primary key.
pub fn get_by_pk<M: Model, K: ToSql>(conn: &Connection, pk: K) -> Result<Option<M>, QueryError> {
    let pk_column = column(M::PRIMARY_KEY)?;
    let sql = format!(
        "SELECT * FROM {} WHERE {pk_column} = ?1",
        table::<M>()?
    );
    Ok(conn.query_row(&sql, [pk], |row| M::from_row(row)).optional()?)
}

/// Fetches the single model matching `attrs`.
///
/// # Errors
///
/// `QueryError::NotFound` when nothing matches and
/// `QueryError::MultipleResults` when more than one row does.
pub fn get_one<M: Model>(conn: &Connection, attrs: &[Attr<'_>]) -> Result<M, QueryError> {
    let rowid = one_rowid::<M>(conn, attrs)?;
    fetch_rowid::<M>(conn, rowid)
}

/// Fetches the first model matching `attrs`, if any.
pub fn first<M: Model>(conn: &Connection, attrs: &[Attr<'_>]) -> Result<Option<M>, QueryError> {
    let (clause, values) = where_clause(attrs)?;
    let sql = format!(
        "SELECT * FROM {}{clause} ORDER BY rowid LIMIT 1",
        table::<M>()?
    );
    Ok(conn
        .query_row(&sql, params_from_iter(values.iter()), |row| M::from_row(row))
        .optional()?)
}

/// Returns the model matching `attrs`, inserting it first if none exists.
///
/// The flag is `true` when a row was inserted.
pub fn get_or_create<M: Model>(
    conn: &Connection,
    attrs: &[Attr<'_>],
) -> Result<(M, bool), QueryError> {
    match get_one::<M>(conn, attrs) {
        Ok(found) => Ok((found, false)),
        Err(QueryError::NotFound { .. }) => {
            let rowid = insert::<M>(conn, attrs)?;
            Ok((fetch_rowid::<M>(conn, rowid)?, true))
        }
        Err(e) => Err(e),
    }
}

/// Updates the model matching `lookup` with `defaults`, or inserts a new one.
///
/// A new row gets the `lookup` attributes plus `create_defaults` when given,
/// otherwise plus `defaults`. The flag is `true` when a row was inserted.
pub fn update_or_create<M: Model>(
    conn: &Connection,
    lookup: &[Attr<'_>],
    defaults: &[Attr<'_>],
    create_defaults: Option<&[Attr<'_>]>,
) -> Result<(M, bool), QueryError> {
    match one_rowid::<M>(conn, lookup) {
        Ok(rowid) => {
            if !defaults.is_empty() {
                let mut assignments = Vec::with_capacity(defaults.len());
                let mut values = Vec::with_capacity(defaults.len() + 1);
                for (name, value) in defaults {
                    assignments.push(format!("{} = ?", column(name)?));
                    values.push(value.clone());
                }
                values.push(Value::Integer(rowid));
                let sql = format!(
                    "UPDATE {} SET {} WHERE rowid = ?",
                    table::<M>()?,
                    assignments.join(", ")
                );
                conn.execute(&sql, params_from_iter(values.iter()))?;
            }
            Ok((fetch_rowid::<M>(conn, rowid)?, false))
        }
        Err(QueryError::NotFound { .. }) => {
            let extra = create_defaults.unwrap_or(defaults);
            let mut attrs: Vec<Attr<'_>> = lookup.to_vec();
            for (name, value) in extra {
                match attrs.iter_mut().find(|(existing, _)| existing == name) {
                    Some(slot) => slot.1 = value.clone(),
                    None => attrs.push((*name, value.clone())),
                }
            }
            let rowid = insert::<M>(conn, &attrs)?;
            Ok((fetch_rowid::<M>(conn, rowid)?, true))
        }
        Err(e) => Err(e),
    }
}

fn table<M: Model>() -> Result<String, QueryError> {
    column(M::TABLE)
}

fn column(name: &str) -> Result<String, QueryError> {
    if is_identifier(name) {
        Ok(quote(name))
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

fn where_clause(attrs: &[Attr<'_>]) -> Result<(String, Vec<Value>), QueryError> {
    if attrs.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut conditions = Vec::with_capacity(attrs.len());
    let mut values = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        let name = column(name)?;
        if *value == Value::Null {
            conditions.push(format!("{name} IS NULL"));
        } else {
            conditions.push(format!("{name} = ?"));
            values.push(value.clone());
        }
    }
    Ok((format!(" WHERE {}", conditions.join(" AND ")), values))
}

fn one_rowid<M: Model>(conn: &Connection, attrs: &[Attr<'_>]) -> Result<i64, QueryError> {
    let (clause, values) = where_clause(attrs)?;
    let sql = format!("SELECT rowid FROM {}{clause} LIMIT 2", table::<M>()?);
    let mut stmt = conn.prepare(&sql)?;
    let rowids = stmt
        .query_map(params_from_iter(values.iter()), |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    match rowids.as_slice() {
        [] => Err(QueryError::NotFound { table: M::TABLE }),
        [rowid] => Ok(*rowid),
        _ => Err(QueryError::MultipleResults { table: M::TABLE }),
    }
}

fn fetch_rowid<M: Model>(conn: &Connection, rowid: i64) -> Result<M, QueryError> {
    let sql = format!("SELECT * FROM {} WHERE rowid = ?1", table::<M>()?);
    Ok(conn.query_row(&sql, [rowid], |row| M::from_row(row))?)
}

fn insert<M: Model>(conn: &Connection, attrs: &[Attr<'_>]) -> Result<i64, QueryError> {
    let table = table::<M>()?;
    if attrs.is_empty() {
        conn.execute(&format!("INSERT INTO {table} DEFAULT VALUES"), [])?;
        return Ok(conn.last_insert_rowid());
    }
    let mut names = Vec::with_capacity(attrs.len());
    let mut values = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        names.push(column(name)?);
        values.push(value.clone());
    }
    let placeholders = vec!["?"; names.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        names.join(", ")
    );
    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(conn.last_insert_rowid())
}
