//! Configuration for load runs.

use crate::reconcile::{default_specs, ReconciliationSpec, Tolerance};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Run reconciliation after every load.
    pub validate_after_load: bool,
    /// Fail the run when reconciliation finds a mismatch.
    pub fail_on_mismatch: bool,
    /// Create the recommended secondary indexes during schema setup.
    pub create_indexes: bool,
    /// Tolerance for specs that do not carry their own.
    pub default_tolerance: Tolerance,
    /// Reconciliation specs.
    pub specs: Vec<ReconciliationSpec>,
}

impl EngineConfig {
    /// Creates the default configuration: validate after load, report
    /// mismatches without failing, create indexes, default specs.
    pub fn new() -> Self {
        Self {
            validate_after_load: true,
            fail_on_mismatch: false,
            create_indexes: true,
            default_tolerance: Tolerance::default(),
            specs: default_specs(),
        }
    }

    /// Sets whether to reconcile after loading.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_after_load = enabled;
        self
    }

    /// Sets whether a reconciliation mismatch fails the run.
    pub fn with_fail_on_mismatch(mut self, enabled: bool) -> Self {
        self.fail_on_mismatch = enabled;
        self
    }

    /// Sets whether to create secondary indexes.
    pub fn with_indexes(mut self, enabled: bool) -> Self {
        self.create_indexes = enabled;
        self
    }

    /// Sets the default tolerance.
    pub fn with_default_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.default_tolerance = tolerance;
        self
    }

    /// Replaces the reconciliation specs.
    pub fn with_specs(mut self, specs: Vec<ReconciliationSpec>) -> Self {
        self.specs = specs;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
