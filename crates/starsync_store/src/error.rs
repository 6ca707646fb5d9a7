//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite returned an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The referenced table does not exist in the store.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A table or column name is not a plain identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A unique or primary key constraint would be violated.
    #[error("constraint violation on {table}: {message}")]
    Constraint {
        /// Table the write targeted.
        table: String,
        /// What was violated.
        message: String,
    },

    /// A value could not be interpreted as the requested type.
    #[error("type mismatch for column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Column being read.
        column: String,
        /// Expected type name.
        expected: &'static str,
        /// Debug rendering of the value found.
        found: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a constraint violation error.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            table: table.into(),
            message: message.into(),
        }
    }
}
