//! In-memory store for testing.

use crate::backend::{ReadStore, WriteStore};
use crate::error::{StoreError, StoreResult};
use crate::query::{AggregateQuery, Predicate};
use crate::row::Row;
use crate::schema::{IndexDef, TableDef};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default, Clone)]
struct MemTable {
    def: Option<TableDef>,
    rows: Vec<Row>,
    next_key: i64,
}

impl MemTable {
    fn check_columns(&self, row: &Row) -> StoreResult<()> {
        let Some(def) = &self.def else {
            return Ok(());
        };
        for column in row.column_names() {
            if !def.has_column(column) {
                return Err(StoreError::constraint(
                    &def.name,
                    format!("unknown column {column}"),
                ));
            }
        }
        Ok(())
    }
}

/// An in-memory store implementing both [`ReadStore`] and [`WriteStore`].
///
/// Suitable for:
/// - Unit tests (as source, target, or both)
/// - Scenario tests that need to inspect every row written
///
/// Tables created through [`WriteStore::ensure_table`] enforce their
/// definition: declared columns only, NOT NULL, natural-key uniqueness and
/// surrogate key assignment. Tables created through [`InMemoryStore::seed`]
/// accept any row.
///
/// # Example
///
/// ```rust
/// use starsync_store::{InMemoryStore, ReadStore, Row};
///
/// let store = InMemoryStore::new();
/// store.seed("actor", vec![Row::new().with("actor_id", 1).with("first_name", "PENELOPE")]);
/// assert_eq!(store.find("actor", None).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<BTreeMap<String, MemTable>>,
    indexes: RwLock<BTreeMap<String, IndexDef>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    writes: AtomicU64,
    failing_table: RwLock<Option<String>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows to a table, creating an undeclared table if needed.
    ///
    /// Declared tables still enforce their definition; a violation panics,
    /// since seeding is test setup.
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        let declared = self
            .tables
            .read()
            .get(table)
            .is_some_and(|t| t.def.is_some());
        if declared {
            for row in rows {
                if let Err(e) = self.insert(table, row) {
                    panic!("seeding {table} failed: {e}");
                }
            }
            return;
        }
        let mut tables = self.tables.write();
        let entry = tables.entry(table.to_string()).or_default();
        entry.rows.extend(rows);
    }

    /// Returns a copy of all rows in a table (empty if unknown).
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Returns a copy of every table's rows, keyed by table name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Row>> {
        self.tables
            .read()
            .iter()
            .map(|(name, t)| (name.clone(), t.rows.clone()))
            .collect()
    }

    /// Names of all tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Returns true if an index with this name was created.
    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    /// Number of successful inserts and updates so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of times [`ReadStore::close`] was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Returns true once the store has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write to `table` fail with a backend error.
    ///
    /// Used to test abort and cleanup paths.
    pub fn fail_writes_to(&self, table: &str) {
        *self.failing_table.write() = Some(table.to_string());
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, table: &str) -> StoreResult<()> {
        self.check_open()?;
        if self.failing_table.read().as_deref() == Some(table) {
            return Err(StoreError::Backend(format!("injected write failure on {table}")));
        }
        Ok(())
    }
}

impl ReadStore for InMemoryStore {
    fn find(&self, table: &str, filter: Option<&Predicate>) -> StoreResult<Vec<Row>> {
        self.check_open()?;
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(t.rows
            .iter()
            .filter(|row| filter.map_or(true, |p| p.matches(row)))
            .cloned()
            .collect())
    }

    fn aggregate(&self, query: &AggregateQuery) -> StoreResult<f64> {
        self.check_open()?;
        query.validate()?;
        let tables = self.tables.read();
        let t = tables
            .get(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;
        let matching: Vec<&Row> = t
            .rows
            .iter()
            .filter(|row| query.filter.as_ref().map_or(true, |p| p.matches(row)))
            .collect();
        Ok(query.aggregate.fold(&matching))
    }

    fn close(&self) -> StoreResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl WriteStore for InMemoryStore {
    fn ensure_table(&self, def: &TableDef) -> StoreResult<()> {
        self.check_open()?;
        def.validate()?;
        let mut tables = self.tables.write();
        let entry = tables.entry(def.name.clone()).or_insert_with(|| MemTable {
            def: None,
            rows: Vec::new(),
            next_key: 1,
        });
        if entry.def.is_none() {
            entry.def = Some(def.clone());
        }
        Ok(())
    }

    fn ensure_index(&self, def: &IndexDef) -> StoreResult<()> {
        self.check_open()?;
        def.validate()?;
        let tables = self.tables.read();
        let table = tables
            .get(&def.table)
            .ok_or_else(|| StoreError::UnknownTable(def.table.clone()))?;
        if let Some(table_def) = &table.def {
            if let Some(missing) = def.columns.iter().find(|c| !table_def.has_column(c)) {
                return Err(StoreError::constraint(
                    &def.table,
                    format!("index {} references unknown column {missing}", def.name),
                ));
            }
        }
        self.indexes
            .write()
            .entry(def.name.clone())
            .or_insert_with(|| def.clone());
        Ok(())
    }

    fn insert(&self, table: &str, mut row: Row) -> StoreResult<Row> {
        self.check_writable(table)?;
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        t.check_columns(&row)?;

        if let Some(def) = t.def.clone() {
            for column in def.columns.iter().filter(|c| !c.nullable) {
                if row.get(&column.name).map_or(true, Value::is_null) {
                    return Err(StoreError::constraint(
                        table,
                        format!("NOT NULL column {} is null", column.name),
                    ));
                }
            }
            let identity = def.identity(&row)?;
            if t.rows.iter().any(|existing| identity.matches(existing)) {
                return Err(StoreError::constraint(
                    table,
                    format!("duplicate natural key {identity:?}"),
                ));
            }
            if let Some(key) = &def.surrogate_key {
                match row.opt_i64(key)? {
                    Some(explicit) => {
                        if t.rows.iter().any(|r| r.opt_i64(key).ok().flatten() == Some(explicit)) {
                            return Err(StoreError::constraint(
                                table,
                                format!("duplicate {key} {explicit}"),
                            ));
                        }
                        t.next_key = t.next_key.max(explicit + 1);
                    }
                    None => {
                        let assigned = t.next_key.max(1);
                        t.next_key = assigned + 1;
                        row.set(key.clone(), assigned);
                    }
                }
            }
        }

        t.rows.push(row.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    fn update(&self, table: &str, predicate: &Predicate, changes: &Row) -> StoreResult<usize> {
        self.check_writable(table)?;
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        t.check_columns(changes)?;

        let mut updated = 0;
        for row in t.rows.iter_mut().filter(|r| predicate.matches(r)) {
            row.merge(changes);
            updated += 1;
        }
        if updated > 0 {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn dim_film() -> TableDef {
        TableDef::new("dim_film")
            .surrogate("film_key")
            .natural_key(&["film_id"])
            .column("film_id", ColumnType::Integer)
            .column("title", ColumnType::Text)
            .nullable("rating", ColumnType::Text)
    }

    #[test]
    fn insert_assigns_sequential_surrogate_keys() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();

        let a = store
            .insert("dim_film", Row::new().with("film_id", 10).with("title", "A"))
            .unwrap();
        let b = store
            .insert("dim_film", Row::new().with("film_id", 20).with("title", "B"))
            .unwrap();

        assert_eq!(a.i64("film_key").unwrap(), 1);
        assert_eq!(b.i64("film_key").unwrap(), 2);
    }

    #[test]
    fn explicit_surrogate_key_is_kept() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();
        store
            .insert(
                "dim_film",
                Row::new().with("film_key", 7).with("film_id", 1).with("title", "A"),
            )
            .unwrap();
        let next = store
            .insert("dim_film", Row::new().with("film_id", 2).with("title", "B"))
            .unwrap();
        assert_eq!(next.i64("film_key").unwrap(), 8);
    }

    #[test]
    fn duplicate_natural_key_is_rejected() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();
        store
            .insert("dim_film", Row::new().with("film_id", 1).with("title", "A"))
            .unwrap();
        let result = store.insert("dim_film", Row::new().with("film_id", 1).with("title", "B"));
        assert!(matches!(result, Err(StoreError::Constraint { .. })));
    }

    #[test]
    fn not_null_and_unknown_columns_are_rejected() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();
        assert!(store.insert("dim_film", Row::new().with("film_id", 1)).is_err());
        assert!(store
            .insert(
                "dim_film",
                Row::new().with("film_id", 1).with("title", "A").with("bogus", 1)
            )
            .is_err());
    }

    #[test]
    fn update_merges_changes() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();
        store
            .insert("dim_film", Row::new().with("film_id", 1).with("title", "A"))
            .unwrap();

        let n = store
            .update(
                "dim_film",
                &Predicate::eq("film_id", 1),
                &Row::new().with("rating", "PG"),
            )
            .unwrap();
        assert_eq!(n, 1);

        let row = store
            .find_one("dim_film", &Predicate::eq("film_id", 1))
            .unwrap()
            .unwrap();
        assert_eq!(row.text("rating").unwrap(), "PG");
        assert_eq!(row.text("title").unwrap(), "A");
        assert_eq!(row.i64("film_key").unwrap(), 1);
    }

    #[test]
    fn aggregate_over_seeded_table() {
        let store = InMemoryStore::new();
        store.seed(
            "payment",
            vec![
                Row::new().with("amount", 2.99),
                Row::new().with("amount", 0.99),
            ],
        );
        let count = store.aggregate(&AggregateQuery::count("payment")).unwrap();
        let sum = store
            .aggregate(&AggregateQuery::sum("payment", "amount"))
            .unwrap();
        assert!((count - 2.0).abs() < f64::EPSILON);
        assert!((sum - 3.98).abs() < 1e-9);
    }

    #[test]
    fn unknown_table_errors() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.find("nope", None),
            Err(StoreError::UnknownTable(_))
        ));
        assert!(store.aggregate(&AggregateQuery::count("nope")).is_err());
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = InMemoryStore::new();
        store.seed("t", vec![Row::new().with("x", 1)]);
        store.close().unwrap();
        store.close().unwrap();
        assert_eq!(store.close_calls(), 2);
        assert!(matches!(store.find("t", None), Err(StoreError::Closed)));
    }

    #[test]
    fn injected_write_failure() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();
        store.fail_writes_to("dim_film");
        let result = store.insert("dim_film", Row::new().with("film_id", 1).with("title", "A"));
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[test]
    fn index_requires_known_columns() {
        let store = InMemoryStore::new();
        store.ensure_table(&dim_film()).unwrap();
        store
            .ensure_index(&IndexDef::new("idx_film_title", "dim_film", &["title"]))
            .unwrap();
        assert!(store.has_index("idx_film_title"));
        assert!(store
            .ensure_index(&IndexDef::new("idx_bad", "dim_film", &["nope"]))
            .is_err());
    }
}
