//! Post-load reconciliation of source and target.
//!
//! Each [`ReconciliationSpec`] compares a row count (and optionally a set of
//! named aggregates) evaluated independently against the source and the
//! target store. A comparison fails when the absolute difference exceeds
//! `tolerance.absolute` **or** the relative difference exceeds
//! `tolerance.percent`.
//!
//! ## Example
//!
//! ```rust
//! use starsync_engine::{check_threshold, Tolerance};
//!
//! let tolerance = Tolerance::new(0.05, 5.0);
//! assert!(check_threshold(100.0, 94.0, &tolerance).exceeded);
//! assert!(!check_threshold(100.0, 96.0, &tolerance).exceeded);
//! ```

use crate::error::{EngineError, EngineResult};
use crate::schema;
use serde::{Deserialize, Serialize};
use starsync_store::{is_identifier, AggregateQuery, ReadStore, StoreError, StoreResult};

/// Allowed difference between source and target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Relative difference allowed, as a fraction of the source value.
    #[serde(default = "Tolerance::default_percent")]
    pub percent: f64,
    /// Absolute difference allowed.
    #[serde(default = "Tolerance::default_absolute")]
    pub absolute: f64,
}

impl Tolerance {
    /// Creates a tolerance.
    pub fn new(percent: f64, absolute: f64) -> Self {
        Self { percent, absolute }
    }

    fn default_percent() -> f64 {
        0.01
    }

    fn default_absolute() -> f64 {
        1.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new(Self::default_percent(), Self::default_absolute())
    }
}

/// Outcome of comparing one source value with one target value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    /// Source value.
    pub source: f64,
    /// Target value.
    pub target: f64,
    /// `source - target`.
    pub diff: f64,
    /// `|source - target|`.
    pub abs_diff: f64,
    /// `abs_diff / |source|`; 0 when both are 0, 1 when only the source is 0.
    pub percent_diff: f64,
    /// True if the tolerance was exceeded.
    pub exceeded: bool,
}

impl Comparison {
    /// Returns true if the values agree within tolerance.
    pub fn passed(&self) -> bool {
        !self.exceeded
    }
}

/// Compares `source` and `target` against `tolerance`.
pub fn check_threshold(source: f64, target: f64, tolerance: &Tolerance) -> Comparison {
    let diff = source - target;
    let abs_diff = diff.abs();
    let percent_diff = if source == 0.0 {
        if abs_diff == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        abs_diff / source.abs()
    };
    Comparison {
        source,
        target,
        diff,
        abs_diff,
        percent_diff,
        exceeded: abs_diff > tolerance.absolute || percent_diff > tolerance.percent,
    }
}

/// A named aggregate evaluated on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCheck {
    /// Name used in reports.
    pub name: String,
    /// Expression evaluated against the source.
    pub source: AggregateQuery,
    /// Expression evaluated against the target. Defaults to the source
    /// expression applied to the spec's target table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AggregateQuery>,
}

impl AggregateCheck {
    /// Creates a check whose target expression mirrors the source one.
    pub fn new(name: impl Into<String>, source: AggregateQuery) -> Self {
        Self {
            name: name.into(),
            source,
            target: None,
        }
    }

    /// Sets an explicit target expression.
    #[must_use]
    pub fn with_target(mut self, target: AggregateQuery) -> Self {
        self.target = Some(target);
        self
    }

    fn target_query(&self, table: &str) -> AggregateQuery {
        self.target.clone().unwrap_or_else(|| AggregateQuery {
            table: table.to_string(),
            ..self.source.clone()
        })
    }
}

/// What to compare for one target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSpec {
    /// Target table; also the spec's name.
    pub table: String,
    /// Source count expression. Defaults to counting `table` in the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_count: Option<AggregateQuery>,
    /// Target count expression. Defaults to counting `table` in the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_count: Option<AggregateQuery>,
    /// Additional aggregate comparisons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<AggregateCheck>,
    /// Tolerance; the reconciler default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Tolerance>,
}

impl ReconciliationSpec {
    /// Creates a spec that counts `table` on both sides.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            source_count: None,
            target_count: None,
            aggregates: Vec::new(),
            tolerance: None,
        }
    }

    /// Counts rows of `source_table` on the source side.
    #[must_use]
    pub fn counting_source(mut self, source_table: impl Into<String>) -> Self {
        self.source_count = Some(AggregateQuery::count(source_table));
        self
    }

    /// Sets the source count expression.
    #[must_use]
    pub fn with_source_count(mut self, query: AggregateQuery) -> Self {
        self.source_count = Some(query);
        self
    }

    /// Sets the target count expression.
    #[must_use]
    pub fn with_target_count(mut self, query: AggregateQuery) -> Self {
        self.target_count = Some(query);
        self
    }

    /// Adds an aggregate comparison.
    #[must_use]
    pub fn with_aggregate(mut self, check: AggregateCheck) -> Self {
        self.aggregates.push(check);
        self
    }

    /// Sets the tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    fn source_count_query(&self) -> AggregateQuery {
        self.source_count
            .clone()
            .unwrap_or_else(|| AggregateQuery::count(self.table.clone()))
    }

    fn target_count_query(&self) -> AggregateQuery {
        self.target_count
            .clone()
            .unwrap_or_else(|| AggregateQuery::count(self.table.clone()))
    }

    /// Checks every table and field name is an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSpec`] naming this spec.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |what: &str, e: StoreError| {
            EngineError::invalid_spec(&self.table, format!("{what}: {e}"))
        };
        if !is_identifier(&self.table) {
            return Err(EngineError::invalid_spec(&self.table, "table is not an identifier"));
        }
        self.source_count_query()
            .validate()
            .map_err(|e| invalid("source count", e))?;
        self.target_count_query()
            .validate()
            .map_err(|e| invalid("target count", e))?;
        for check in &self.aggregates {
            check
                .source
                .validate()
                .map_err(|e| invalid(&format!("aggregate {} source", check.name), e))?;
            check
                .target_query(&self.table)
                .validate()
                .map_err(|e| invalid(&format!("aggregate {} target", check.name), e))?;
        }
        if let Some(t) = &self.tolerance {
            if !(t.percent >= 0.0 && t.absolute >= 0.0) {
                return Err(EngineError::invalid_spec(
                    &self.table,
                    "tolerance must be non-negative",
                ));
            }
        }
        Ok(())
    }
}

/// Parses a JSON array of specs and validates each one.
///
/// # Errors
///
/// Returns [`EngineError::InvalidSpec`] if the JSON is malformed or a spec
/// is invalid.
pub fn parse_specs(json: &str) -> EngineResult<Vec<ReconciliationSpec>> {
    let specs: Vec<ReconciliationSpec> =
        serde_json::from_str(json).map_err(|e| EngineError::invalid_spec("<json>", e.to_string()))?;
    for spec in &specs {
        spec.validate()?;
    }
    Ok(specs)
}

/// The built-in checks: films, actors, rentals and payments, with the
/// payment total compared within 5% or 5 currency units.
pub fn default_specs() -> Vec<ReconciliationSpec> {
    vec![
        ReconciliationSpec::new(schema::DIM_FILM).counting_source(schema::source::FILM),
        ReconciliationSpec::new(schema::DIM_ACTOR).counting_source(schema::source::ACTOR),
        ReconciliationSpec::new(schema::FACT_RENTAL).counting_source(schema::source::RENTAL),
        ReconciliationSpec::new(schema::FACT_PAYMENT)
            .counting_source(schema::source::PAYMENT)
            .with_aggregate(AggregateCheck::new(
                "total_amount",
                AggregateQuery::sum(schema::source::PAYMENT, "amount"),
            ))
            .with_tolerance(Tolerance::new(0.05, 5.0)),
    ]
}

/// Result of one named aggregate comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    /// Aggregate name.
    pub name: String,
    /// The comparison.
    #[serde(flatten)]
    pub comparison: Comparison,
}

/// Result of one spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReconciliation {
    /// Target table.
    pub table: String,
    /// Row count comparison; absent if evaluation failed.
    pub count: Option<Comparison>,
    /// Aggregate comparisons.
    pub aggregates: Vec<AggregateResult>,
    /// Evaluation failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReconciliation {
    /// True if evaluation succeeded and every comparison is within tolerance.
    pub fn passed(&self) -> bool {
        self.error.is_none()
            && self.count.is_some_and(|c| c.passed())
            && self.aggregates.iter().all(|a| a.comparison.passed())
    }
}

/// Results of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    /// One entry per spec, in spec order.
    pub tables: Vec<TableReconciliation>,
}

impl ReconciliationReport {
    /// True if every table passed.
    pub fn passed(&self) -> bool {
        self.tables.iter().all(TableReconciliation::passed)
    }

    /// Tables that did not pass.
    pub fn failures(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.passed())
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Looks up the result of one table.
    pub fn table(&self, table: &str) -> Option<&TableReconciliation> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Turns a failed report into [`EngineError::ReconciliationFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error listing every table that did not pass.
    pub fn fail_on_mismatch(&self) -> EngineResult<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(EngineError::ReconciliationFailed {
                tables: self.failures().into_iter().map(String::from).collect(),
            })
        }
    }
}

/// Evaluates specs against a source and a target store. Read-only.
pub struct Reconciler<'a, S: ReadStore + ?Sized, T: ReadStore + ?Sized> {
    source: &'a S,
    target: &'a T,
    default_tolerance: Tolerance,
}

impl<'a, S: ReadStore + ?Sized, T: ReadStore + ?Sized> Reconciler<'a, S, T> {
    /// Creates a reconciler with the default tolerance.
    pub fn new(source: &'a S, target: &'a T) -> Self {
        Self {
            source,
            target,
            default_tolerance: Tolerance::default(),
        }
    }

    /// Sets the tolerance for specs that do not carry their own.
    #[must_use]
    pub fn with_default_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.default_tolerance = tolerance;
        self
    }

    /// Evaluates every spec.
    ///
    /// All specs are validated before anything is read. A store failure
    /// while evaluating one spec is recorded in that spec's result and the
    /// pass continues with the next one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSpec`] for a malformed spec.
    pub fn reconcile(&self, specs: &[ReconciliationSpec]) -> EngineResult<ReconciliationReport> {
        for spec in specs {
            spec.validate()?;
        }

        let mut report = ReconciliationReport::default();
        for spec in specs {
            let result = match self.evaluate(spec) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(table = %spec.table, error = %e, "reconciliation failed");
                    TableReconciliation {
                        table: spec.table.clone(),
                        count: None,
                        aggregates: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            log_result(&result);
            report.tables.push(result);
        }
        Ok(report)
    }

    fn evaluate(&self, spec: &ReconciliationSpec) -> StoreResult<TableReconciliation> {
        let tolerance = spec.tolerance.unwrap_or(self.default_tolerance);

        let source_count = self.source.aggregate(&spec.source_count_query())?;
        let target_count = self.target.aggregate(&spec.target_count_query())?;
        let count = check_threshold(source_count, target_count, &tolerance);

        let mut aggregates = Vec::with_capacity(spec.aggregates.len());
        for check in &spec.aggregates {
            let source = self.source.aggregate(&check.source)?;
            let target = self.target.aggregate(&check.target_query(&spec.table))?;
            aggregates.push(AggregateResult {
                name: check.name.clone(),
                comparison: check_threshold(source, target, &tolerance),
            });
        }

        Ok(TableReconciliation {
            table: spec.table.clone(),
            count: Some(count),
            aggregates,
            error: None,
        })
    }
}

fn log_result(result: &TableReconciliation) {
    if let Some(count) = &result.count {
        if count.passed() {
            tracing::info!(table = %result.table, source = count.source, "count ok");
        } else {
            tracing::warn!(
                table = %result.table,
                source = count.source,
                target = count.target,
                "count mismatch"
            );
        }
    }
    for aggregate in &result.aggregates {
        let c = &aggregate.comparison;
        if c.passed() {
            tracing::info!(table = %result.table, aggregate = %aggregate.name, source = c.source, "aggregate ok");
        } else {
            tracing::warn!(
                table = %result.table,
                aggregate = %aggregate.name,
                source = c.source,
                target = c.target,
                "aggregate mismatch"
            );
        }
    }
}
