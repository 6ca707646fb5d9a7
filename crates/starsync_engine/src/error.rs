//! Error types for the sync engine.

use starsync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during a load or reconciliation run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Source or target store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A loader failed; the run was aborted.
    #[error("loader for {table} failed: {source}")]
    Loader {
        /// Target table the loader writes.
        table: String,
        /// Underlying failure.
        source: Box<EngineError>,
    },

    /// Reconciliation found mismatches and the caller asked to fail on them.
    #[error("reconciliation failed for {}", tables.join(", "))]
    ReconciliationFailed {
        /// Tables that did not pass.
        tables: Vec<String>,
    },

    /// A reconciliation spec is malformed.
    #[error("invalid reconciliation spec {spec}: {message}")]
    InvalidSpec {
        /// Spec name (its target table).
        spec: String,
        /// What is wrong with it.
        message: String,
    },

    /// A run was started while another was in progress.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl EngineError {
    /// Wraps an error raised inside the loader for `table`.
    pub fn loader(table: impl Into<String>, source: EngineError) -> Self {
        Self::Loader {
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid spec error.
    pub fn invalid_spec(spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.into(),
            message: message.into(),
        }
    }

    /// Returns the table of the failed loader, if this is a loader failure.
    pub fn failed_table(&self) -> Option<&str> {
        match self {
            EngineError::Loader { table, .. } => Some(table),
            _ => None,
        }
    }
}
