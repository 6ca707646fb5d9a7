//! Store trait definitions.

use crate::error::StoreResult;
use crate::query::{AggregateQuery, Predicate};
use crate::row::Row;
use crate::schema::{IndexDef, TableDef};
use std::sync::Arc;

/// Read access to a tabular store.
///
/// This is all the sync engine needs from the source side, and what the
/// reconciliation pass needs from both sides.
///
/// # Invariants
///
/// - `find` returns rows in a stable order (insertion / rowid order)
/// - `aggregate` never mutates the store
/// - after `close`, every operation fails with [`crate::StoreError::Closed`]
pub trait ReadStore: Send + Sync {
    /// Returns every row of `table` matching `filter` (all rows when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, a name is not an
    /// identifier, or the underlying store fails.
    fn find(&self, table: &str, filter: Option<&Predicate>) -> StoreResult<Vec<Row>>;

    /// Evaluates a single-value aggregate expression.
    ///
    /// Aggregates over zero rows yield `0.0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query references unknown or invalid names.
    fn aggregate(&self, query: &AggregateQuery) -> StoreResult<f64>;

    /// Releases the underlying connection.
    ///
    /// Closing twice is an error-free no-op for the second call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to release its resources.
    fn close(&self) -> StoreResult<()>;
}

/// Write access to a tabular store whose tables are declared with
/// [`TableDef`]s.
pub trait WriteStore: ReadStore {
    /// Creates the table if it does not exist (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid or the DDL fails.
    fn ensure_table(&self, def: &TableDef) -> StoreResult<()>;

    /// Creates the index if it does not exist (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid or the DDL fails.
    fn ensure_index(&self, def: &IndexDef) -> StoreResult<()>;

    /// Returns the first row of `table` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the read fails.
    fn find_one(&self, table: &str, predicate: &Predicate) -> StoreResult<Option<Row>> {
        Ok(self.find(table, Some(predicate))?.into_iter().next())
    }

    /// Inserts a row and returns it as stored.
    ///
    /// If the table has a surrogate key and the row does not carry one, the
    /// store assigns the next key and includes it in the returned row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Constraint`] if the natural key already
    /// exists, or an error if the write fails.
    fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Overwrites `changes` on every row matching `predicate` and returns the
    /// number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or a column does not exist or the write
    /// fails.
    fn update(&self, table: &str, predicate: &Predicate, changes: &Row) -> StoreResult<usize>;
}

impl<S: ReadStore + ?Sized> ReadStore for Arc<S> {
    fn find(&self, table: &str, filter: Option<&Predicate>) -> StoreResult<Vec<Row>> {
        (**self).find(table, filter)
    }

    fn aggregate(&self, query: &AggregateQuery) -> StoreResult<f64> {
        (**self).aggregate(query)
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }
}

impl<S: WriteStore + ?Sized> WriteStore for Arc<S> {
    fn ensure_table(&self, def: &TableDef) -> StoreResult<()> {
        (**self).ensure_table(def)
    }

    fn ensure_index(&self, def: &IndexDef) -> StoreResult<()> {
        (**self).ensure_index(def)
    }

    fn find_one(&self, table: &str, predicate: &Predicate) -> StoreResult<Option<Row>> {
        (**self).find_one(table, predicate)
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        (**self).insert(table, row)
    }

    fn update(&self, table: &str, predicate: &Predicate, changes: &Row) -> StoreResult<usize> {
        (**self).update(table, predicate, changes)
    }
}
