//! Ordered column-to-value rows.

use crate::error::{StoreError, StoreResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Date, PrimitiveDateTime};

/// A single record: column name to value, ordered by column name.
///
/// Missing columns and explicit `NULL` both read as absent through the
/// `opt_*` accessors; the required accessors (`i64`, `text`, ...) fail with
/// [`StoreError::TypeMismatch`] instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Returns the raw value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Removes a column and returns its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    /// Returns true if the row has the column (even if it is null).
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Iterates columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Overwrites this row's columns with every column of `other`.
    pub fn merge(&mut self, other: &Row) {
        for (column, value) in &other.columns {
            self.columns.insert(column.clone(), value.clone());
        }
    }

    /// Returns true if every column of `other` has an equal value here.
    pub fn contains_all(&self, other: &Row) -> bool {
        other
            .columns
            .iter()
            .all(|(column, value)| self.columns.get(column) == Some(value))
    }

    /// Reads a non-null value.
    fn non_null(&self, column: &str) -> Option<&Value> {
        self.columns.get(column).filter(|v| !v.is_null())
    }

    fn mismatch(&self, column: &str, expected: &'static str) -> StoreError {
        StoreError::TypeMismatch {
            column: column.to_string(),
            expected,
            found: self
                .columns
                .get(column)
                .map_or_else(|| "missing".to_string(), |v| format!("{v:?}")),
        }
    }

    /// Reads an optional integer.
    pub fn opt_i64(&self, column: &str) -> StoreResult<Option<i64>> {
        match self.non_null(column) {
            None => Ok(None),
            Some(v) => v
                .as_integer()
                .map(Some)
                .ok_or_else(|| self.mismatch(column, "integer")),
        }
    }

    /// Reads a required integer.
    pub fn i64(&self, column: &str) -> StoreResult<i64> {
        self.opt_i64(column)?
            .ok_or_else(|| self.mismatch(column, "integer"))
    }

    /// Reads an optional number.
    pub fn opt_f64(&self, column: &str) -> StoreResult<Option<f64>> {
        match self.non_null(column) {
            None => Ok(None),
            Some(v) => v
                .as_real()
                .map(Some)
                .ok_or_else(|| self.mismatch(column, "real")),
        }
    }

    /// Reads a required number.
    pub fn f64(&self, column: &str) -> StoreResult<f64> {
        self.opt_f64(column)?.ok_or_else(|| self.mismatch(column, "real"))
    }

    /// Reads optional text.
    pub fn opt_text(&self, column: &str) -> StoreResult<Option<&str>> {
        match self.non_null(column) {
            None => Ok(None),
            Some(v) => v
                .as_text()
                .map(Some)
                .ok_or_else(|| self.mismatch(column, "text")),
        }
    }

    /// Reads required text.
    pub fn text(&self, column: &str) -> StoreResult<&str> {
        self.opt_text(column)?
            .ok_or_else(|| self.mismatch(column, "text"))
    }

    /// Reads an optional timestamp.
    pub fn opt_timestamp(&self, column: &str) -> StoreResult<Option<PrimitiveDateTime>> {
        match self.non_null(column) {
            None => Ok(None),
            Some(v) => v
                .as_timestamp()
                .map(Some)
                .ok_or_else(|| self.mismatch(column, "timestamp")),
        }
    }

    /// Reads a required timestamp.
    pub fn timestamp(&self, column: &str) -> StoreResult<PrimitiveDateTime> {
        self.opt_timestamp(column)?
            .ok_or_else(|| self.mismatch(column, "timestamp"))
    }

    /// Reads an optional date.
    pub fn opt_date(&self, column: &str) -> StoreResult<Option<Date>> {
        match self.non_null(column) {
            None => Ok(None),
            Some(v) => v
                .as_date()
                .map(Some)
                .ok_or_else(|| self.mismatch(column, "date")),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}
