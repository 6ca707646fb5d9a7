//! Table and index definitions.

use crate::error::{StoreError, StoreResult};
use crate::query::{check_identifier, Predicate};
use crate::row::Row;

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer.
    Integer,
    /// Floating point.
    Real,
    /// Text.
    Text,
    /// Date and time, stored as `YYYY-MM-DD HH:MM:SS` text in SQLite.
    Timestamp,
    /// Date, stored as `YYYY-MM-DD` text in SQLite.
    Date,
}

impl ColumnType {
    /// The SQLite declared type.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "DATETIME",
            ColumnType::Date => "DATE",
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

/// A table definition.
///
/// The surrogate key, if any, is an implicit store-generated integer column
/// and is not listed in `columns`. The natural key columns must be listed.
/// Without a surrogate key the natural key is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Store-generated key column.
    pub surrogate_key: Option<String>,
    /// Columns that identify a row; unique.
    pub natural_key: Vec<String>,
    /// All non-surrogate columns.
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Starts a table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            surrogate_key: None,
            natural_key: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Sets the surrogate key column.
    #[must_use]
    pub fn surrogate(mut self, column: impl Into<String>) -> Self {
        self.surrogate_key = Some(column.into());
        self
    }

    /// Sets the natural key columns.
    #[must_use]
    pub fn natural_key(mut self, columns: &[&str]) -> Self {
        self.natural_key = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Adds a NOT NULL column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    /// Adds a nullable column.
    #[must_use]
    pub fn nullable(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            ty,
            nullable: true,
        });
        self
    }

    /// Looks up a column definition.
    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if `name` is the surrogate key or a declared column.
    pub fn has_column(&self, name: &str) -> bool {
        self.surrogate_key.as_deref() == Some(name) || self.column_def(name).is_some()
    }

    /// Builds the equality predicate identifying `row` by its natural key.
    pub fn identity(&self, row: &Row) -> StoreResult<Predicate> {
        let mut parts = Vec::with_capacity(self.natural_key.len());
        for column in &self.natural_key {
            let value = row
                .get(column)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    StoreError::constraint(&self.name, format!("natural key column {column} is null"))
                })?;
            parts.push(Predicate::eq(column.clone(), value.clone()));
        }
        Ok(Predicate::And(parts))
    }

    /// Checks names and that natural key columns are declared.
    pub fn validate(&self) -> StoreResult<()> {
        check_identifier(&self.name)?;
        if let Some(key) = &self.surrogate_key {
            check_identifier(key)?;
        }
        for column in &self.columns {
            check_identifier(&column.name)?;
        }
        if self.natural_key.is_empty() {
            return Err(StoreError::constraint(&self.name, "table has no natural key"));
        }
        for key in &self.natural_key {
            if self.column_def(key).is_none() {
                return Err(StoreError::constraint(
                    &self.name,
                    format!("natural key column {key} is not declared"),
                ));
            }
        }
        Ok(())
    }
}

/// A secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
}

impl IndexDef {
    /// Creates an index definition.
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Checks all names are identifiers and there is at least one column.
    pub fn validate(&self) -> StoreResult<()> {
        check_identifier(&self.name)?;
        check_identifier(&self.table)?;
        if self.columns.is_empty() {
            return Err(StoreError::constraint(&self.table, format!("index {} has no columns", self.name)));
        }
        self.columns.iter().try_for_each(|c| check_identifier(c))
    }
}
