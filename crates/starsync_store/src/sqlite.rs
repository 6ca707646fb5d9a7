//! SQLite-backed store.
//!
//! Works as a source (any existing database, read through [`ReadStore`]) and
//! as a target (tables declared with [`TableDef`]s). Identifiers are checked
//! and quoted; every value is a bound parameter.

use crate::backend::{ReadStore, WriteStore};
use crate::error::{StoreError, StoreResult};
use crate::query::{check_identifier, Aggregate, AggregateQuery, Predicate};
use crate::row::Row;
use crate::schema::{IndexDef, TableDef};
use crate::value::{format_date, format_timestamp, Value};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(SqlValue::Text(format_timestamp(*ts))),
            Value::Date(d) => ToSqlOutput::Owned(SqlValue::Text(format_date(*d))),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

fn quote(name: &str) -> StoreResult<String> {
    check_identifier(name)?;
    Ok(format!("\"{name}\""))
}

fn predicate_sql(predicate: &Predicate, params: &mut Vec<Value>) -> StoreResult<String> {
    match predicate {
        Predicate::Eq { field, value } => {
            params.push(value.clone());
            Ok(format!("{} = ?", quote(field)?))
        }
        Predicate::Gt { field, value } => {
            params.push(value.clone());
            Ok(format!("{} > ?", quote(field)?))
        }
        Predicate::And(parts) if parts.is_empty() => Ok("1 = 1".to_string()),
        Predicate::And(parts) => {
            let clauses = parts
                .iter()
                .map(|p| predicate_sql(p, params).map(|sql| format!("({sql})")))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(clauses.join(" AND "))
        }
    }
}

fn where_clause(filter: Option<&Predicate>, params: &mut Vec<Value>) -> StoreResult<String> {
    match filter {
        Some(p) => Ok(format!(" WHERE {}", predicate_sql(p, params)?)),
        None => Ok(String::new()),
    }
}

fn map_write_error(table: &str, err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, message) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::constraint(table, message.unwrap_or_else(|| e.to_string()))
        }
        other => StoreError::Sqlite(other),
    }
}

fn create_table_sql(def: &TableDef) -> StoreResult<String> {
    let mut parts = Vec::with_capacity(def.columns.len() + 2);
    if let Some(key) = &def.surrogate_key {
        parts.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(key)?));
    }
    for column in &def.columns {
        let null = if column.nullable { "" } else { " NOT NULL" };
        parts.push(format!("{} {}{null}", quote(&column.name)?, column.ty.sql_type()));
    }
    let natural = def
        .natural_key
        .iter()
        .map(|c| quote(c))
        .collect::<StoreResult<Vec<_>>>()?
        .join(", ");
    if def.surrogate_key.is_some() {
        parts.push(format!("UNIQUE ({natural})"));
    } else {
        parts.push(format!("PRIMARY KEY ({natural})"));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(&def.name)?,
        parts.join(",\n  ")
    ))
}

/// SQLite store over a single connection.
///
/// The connection sits behind a mutex so the store is `Send + Sync`; the
/// engine drives it from one thread at a time.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
    surrogates: Mutex<BTreeMap<String, Option<String>>>,
}

impl SqliteStore {
    /// Opens (creating if necessary) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self::from_connection(conn, Some(path)))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            path,
            surrogates: Mutex::new(BTreeMap::new()),
        }
    }

    /// The database file, if this is not an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs raw SQL statements separated by semicolons.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails or the store is closed.
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Returns true if a table with this name exists. Views do not count.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails or the store is closed.
    pub fn table_exists(&self, table: &str) -> StoreResult<bool> {
        self.with_conn(|conn| table_exists(conn, table))
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> StoreResult<R>) -> StoreResult<R> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    fn surrogate_for(&self, conn: &Connection, table: &str) -> StoreResult<Option<String>> {
        if let Some(known) = self.surrogates.lock().get(table) {
            return Ok(known.clone());
        }
        let discovered = integer_primary_key(conn, table)?;
        self.surrogates
            .lock()
            .insert(table.to_string(), discovered.clone());
        Ok(discovered)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |r| r.get(0),
    )?;
    Ok(exists)
}

fn require_table(conn: &Connection, table: &str) -> StoreResult<()> {
    check_identifier(table)?;
    if table_exists(conn, table)? {
        Ok(())
    } else {
        Err(StoreError::UnknownTable(table.to_string()))
    }
}

/// Finds the single `INTEGER PRIMARY KEY` column of a table, if it has one.
fn integer_primary_key(conn: &Connection, table: &str) -> StoreResult<Option<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)?))?;
    let keys = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>("name")?,
                r.get::<_, String>("type")?,
                r.get::<_, i64>("pk")?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let pk: Vec<_> = keys.into_iter().filter(|(_, _, pk)| *pk > 0).collect();
    match pk.as_slice() {
        [(name, ty, _)] if ty.eq_ignore_ascii_case("INTEGER") => Ok(Some(name.clone())),
        _ => Ok(None),
    }
}

impl ReadStore for SqliteStore {
    fn find(&self, table: &str, filter: Option<&Predicate>) -> StoreResult<Vec<Row>> {
        self.with_conn(|conn| {
            require_table(conn, table)?;
            let mut params = Vec::new();
            let sql = format!(
                "SELECT * FROM {}{} ORDER BY rowid",
                quote(table)?,
                where_clause(filter, &mut params)?
            );
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |r| {
                    let mut row = Row::new();
                    for (i, name) in names.iter().enumerate() {
                        row.set(name.clone(), read_value(r.get_ref(i)?));
                    }
                    Ok(row)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn aggregate(&self, query: &AggregateQuery) -> StoreResult<f64> {
        query.validate()?;
        self.with_conn(|conn| {
            require_table(conn, &query.table)?;
            let expr = match &query.aggregate {
                Aggregate::Count => "COUNT(*)".to_string(),
                Aggregate::Sum(c) => format!("COALESCE(SUM({}), 0)", quote(c)?),
                Aggregate::Min(c) => format!("COALESCE(MIN({}), 0)", quote(c)?),
                Aggregate::Max(c) => format!("COALESCE(MAX({}), 0)", quote(c)?),
                Aggregate::Avg(c) => format!("COALESCE(AVG({}), 0)", quote(c)?),
            };
            let mut params = Vec::new();
            let sql = format!(
                "SELECT {expr} FROM {}{}",
                quote(&query.table)?,
                where_clause(query.filter.as_ref(), &mut params)?
            );
            let value = conn.query_row(&sql, params_from_iter(params.iter()), |r| {
                Ok(read_value(r.get_ref(0)?))
            })?;
            Ok(value.as_real().unwrap_or(0.0))
        })
    }

    fn close(&self) -> StoreResult<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        tracing::debug!(path = ?self.path, "closed sqlite store");
        Ok(())
    }
}

impl WriteStore for SqliteStore {
    fn ensure_table(&self, def: &TableDef) -> StoreResult<()> {
        def.validate()?;
        let sql = create_table_sql(def)?;
        self.with_conn(|conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })?;
        self.surrogates
            .lock()
            .insert(def.name.clone(), def.surrogate_key.clone());
        Ok(())
    }

    fn ensure_index(&self, def: &IndexDef) -> StoreResult<()> {
        def.validate()?;
        let columns = def
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<StoreResult<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({columns})",
            quote(&def.name)?,
            quote(&def.table)?
        );
        self.with_conn(|conn| {
            require_table(conn, &def.table)?;
            conn.execute_batch(&sql)?;
            Ok(())
        })
    }

    fn find_one(&self, table: &str, predicate: &Predicate) -> StoreResult<Option<Row>> {
        self.with_conn(|conn| {
            require_table(conn, table)?;
            let mut params = Vec::new();
            let sql = format!(
                "SELECT * FROM {} WHERE {} ORDER BY rowid LIMIT 1",
                quote(table)?,
                predicate_sql(predicate, &mut params)?
            );
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let row = stmt
                .query_row(params_from_iter(params.iter()), |r| {
                    let mut row = Row::new();
                    for (i, name) in names.iter().enumerate() {
                        row.set(name.clone(), read_value(r.get_ref(i)?));
                    }
                    Ok(row)
                })
                .optional()?;
            Ok(row)
        })
    }

    fn insert(&self, table: &str, mut row: Row) -> StoreResult<Row> {
        self.with_conn(|conn| {
            require_table(conn, table)?;
            let mut columns = Vec::with_capacity(row.len());
            let mut values = Vec::with_capacity(row.len());
            for (column, value) in row.iter() {
                columns.push(quote(column)?);
                values.push(value.clone());
            }
            let sql = if columns.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES", quote(table)?)
            } else {
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote(table)?,
                    columns.join(", "),
                    vec!["?"; columns.len()].join(", ")
                )
            };
            conn.execute(&sql, params_from_iter(values.iter()))
                .map_err(|e| map_write_error(table, e))?;

            if let Some(key) = self.surrogate_for(conn, table)? {
                if row.get(&key).map_or(true, Value::is_null) {
                    row.set(key, conn.last_insert_rowid());
                }
            }
            Ok(row)
        })
    }

    fn update(&self, table: &str, predicate: &Predicate, changes: &Row) -> StoreResult<usize> {
        if changes.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            require_table(conn, table)?;
            let mut params = Vec::with_capacity(changes.len());
            let mut assignments = Vec::with_capacity(changes.len());
            for (column, value) in changes.iter() {
                assignments.push(format!("{} = ?", quote(column)?));
                params.push(value.clone());
            }
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                quote(table)?,
                assignments.join(", "),
                predicate_sql(predicate, &mut params)?
            );
            conn.execute(&sql, params_from_iter(params.iter()))
                .map_err(|e| map_write_error(table, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn dim_actor() -> TableDef {
        TableDef::new("dim_actor")
            .surrogate("actor_key")
            .natural_key(&["actor_id"])
            .column("actor_id", ColumnType::Integer)
            .column("first_name", ColumnType::Text)
            .nullable("last_update", ColumnType::Timestamp)
    }

    #[test]
    fn create_table_sql_shapes() {
        let sql = create_table_sql(&dim_actor()).unwrap();
        assert!(sql.contains("\"actor_key\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"first_name\" TEXT NOT NULL"));
        assert!(sql.contains("\"last_update\" DATETIME,") || sql.contains("\"last_update\" DATETIME\n"));
        assert!(sql.contains("UNIQUE (\"actor_id\")"));

        let bridge = TableDef::new("bridge_film_actor")
            .natural_key(&["film_key", "actor_key"])
            .column("film_key", ColumnType::Integer)
            .column("actor_key", ColumnType::Integer);
        let sql = create_table_sql(&bridge).unwrap();
        assert!(sql.contains("PRIMARY KEY (\"film_key\", \"actor_key\")"));
    }

    #[test]
    fn views_are_not_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&dim_actor()).unwrap();
        store
            .with_conn(|conn| {
                conn.execute_batch("CREATE VIEW actor_names AS SELECT first_name FROM dim_actor")?;
                Ok(())
            })
            .unwrap();

        assert!(!store.table_exists("actor_names").unwrap());
        assert!(matches!(
            store.find("actor_names", None),
            Err(StoreError::UnknownTable(name)) if name == "actor_names"
        ));
    }

    #[test]
    fn insert_find_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&dim_actor()).unwrap();
        store.ensure_table(&dim_actor()).unwrap();

        let stored = store
            .insert(
                "dim_actor",
                Row::new()
                    .with("actor_id", 1)
                    .with("first_name", "PENELOPE")
                    .with("last_update", datetime!(2006-02-15 04:34:33)),
            )
            .unwrap();
        assert_eq!(stored.i64("actor_key").unwrap(), 1);

        let n = store
            .update(
                "dim_actor",
                &Predicate::eq("actor_id", 1),
                &Row::new().with("first_name", "NICK"),
            )
            .unwrap();
        assert_eq!(n, 1);

        let row = store
            .find_one("dim_actor", &Predicate::eq("actor_id", 1))
            .unwrap()
            .unwrap();
        assert_eq!(row.text("first_name").unwrap(), "NICK");
        assert_eq!(
            row.timestamp("last_update").unwrap(),
            datetime!(2006-02-15 04:34:33)
        );
    }

    #[test]
    fn duplicate_natural_key_maps_to_constraint() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&dim_actor()).unwrap();
        let row = Row::new().with("actor_id", 1).with("first_name", "A");
        store.insert("dim_actor", row.clone()).unwrap();
        assert!(matches!(
            store.insert("dim_actor", row),
            Err(StoreError::Constraint { .. })
        ));
    }

    #[test]
    fn timestamp_filter_and_aggregates() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE payment (payment_id INTEGER PRIMARY KEY, amount REAL, payment_date DATETIME);
                 INSERT INTO payment VALUES (1, 2.99, '2005-05-25 11:30:37');
                 INSERT INTO payment VALUES (2, 0.99, '2005-05-28 10:35:23');
                 INSERT INTO payment VALUES (3, 5.99, '2005-06-15 00:54:12');",
            )
            .unwrap();

        let later = store
            .find(
                "payment",
                Some(&Predicate::gt("payment_date", datetime!(2005-05-28 10:35:23))),
            )
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].i64("payment_id").unwrap(), 3);

        let count = store.aggregate(&AggregateQuery::count("payment")).unwrap();
        assert!((count - 3.0).abs() < f64::EPSILON);
        let sum = store
            .aggregate(&AggregateQuery::sum("payment", "amount"))
            .unwrap();
        assert!((sum - 9.97).abs() < 1e-9);

        let empty = store
            .aggregate(
                &AggregateQuery::sum("payment", "amount")
                    .with_filter(Predicate::eq("payment_id", 99)),
            )
            .unwrap();
        assert!(empty.abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_table_and_bad_identifier() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.find("missing", None),
            Err(StoreError::UnknownTable(_))
        ));
        assert!(matches!(
            store.find("film; DROP TABLE film", None),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn surrogate_is_discovered_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("target.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.ensure_table(&dim_actor()).unwrap();
            store
                .insert("dim_actor", Row::new().with("actor_id", 1).with("first_name", "A"))
                .unwrap();
            store.close().unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let row = store
            .insert("dim_actor", Row::new().with("actor_id", 2).with("first_name", "B"))
            .unwrap();
        assert_eq!(row.i64("actor_key").unwrap(), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(store.find("x", None), Err(StoreError::Closed)));
    }
}
