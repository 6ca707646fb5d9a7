//! Typed predicates and aggregate expressions.
//!
//! Stores evaluate these directly (the in-memory store) or translate them
//! into parameterized SQL (the SQLite store). Table and field names must be
//! plain identifiers; values are always bound, never spliced.

use crate::error::{StoreError, StoreResult};
use crate::row::Row;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Returns true if `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Fails with [`StoreError::InvalidIdentifier`] unless `name` is an identifier.
pub fn check_identifier(name: &str) -> StoreResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// A row filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `field = value`. Never matches a null column.
    Eq {
        /// Column name.
        field: String,
        /// Value to compare with.
        value: Value,
    },
    /// `field > value`. Never matches a null column.
    Gt {
        /// Column name.
        field: String,
        /// Lower bound (exclusive).
        value: Value,
    },
    /// Conjunction of predicates. An empty conjunction matches every row.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Creates an equality predicate.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a strict greater-than predicate.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an equality conjunction over every column of `row`.
    pub fn matching(row: &Row) -> Self {
        Predicate::And(
            row.iter()
                .map(|(column, value)| Predicate::eq(column, value.clone()))
                .collect(),
        )
    }

    /// Evaluates the predicate against a row.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Eq { field, value } => row
                .get(field)
                .and_then(|v| v.compare(value))
                .is_some_and(Ordering::is_eq),
            Predicate::Gt { field, value } => row
                .get(field)
                .and_then(|v| v.compare(value))
                .is_some_and(Ordering::is_gt),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
        }
    }

    /// Checks every field name is an identifier.
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Predicate::Eq { field, .. } | Predicate::Gt { field, .. } => check_identifier(field),
            Predicate::And(parts) => parts.iter().try_for_each(Predicate::validate),
        }
    }
}

/// Aggregate function applied over the filtered rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Number of rows.
    #[default]
    Count,
    /// Sum of a numeric column; nulls ignored, 0 for no rows.
    Sum(String),
    /// Minimum of a numeric column; 0 for no rows.
    Min(String),
    /// Maximum of a numeric column; 0 for no rows.
    Max(String),
    /// Mean of a numeric column; 0 for no rows.
    Avg(String),
}

impl Aggregate {
    /// The column the aggregate reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum(f) | Aggregate::Min(f) | Aggregate::Max(f) | Aggregate::Avg(f) => {
                Some(f)
            }
        }
    }

    /// Folds numeric values the way SQL would, mapping an empty input to 0.
    #[allow(clippy::cast_precision_loss)]
    pub fn fold(&self, rows: &[&Row]) -> f64 {
        let Some(field) = self.field() else {
            return rows.len() as f64;
        };
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(field).and_then(Value::as_real))
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Aggregate::Min(_) => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max(_) => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregate::Avg(_) => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Sum(_) | Aggregate::Count => values.iter().sum(),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count => f.write_str("count(*)"),
            Aggregate::Sum(c) => write!(f, "sum({c})"),
            Aggregate::Min(c) => write!(f, "min({c})"),
            Aggregate::Max(c) => write!(f, "max({c})"),
            Aggregate::Avg(c) => write!(f, "avg({c})"),
        }
    }
}

/// A single-value expression: `aggregate` over `table` rows matching `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    /// Table to read.
    pub table: String,
    /// Optional row filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    /// Aggregate to compute (defaults to count).
    #[serde(default)]
    pub aggregate: Aggregate,
}

impl AggregateQuery {
    /// Counts the rows of a table.
    pub fn count(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            aggregate: Aggregate::Count,
        }
    }

    /// Sums a column of a table.
    pub fn sum(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            aggregate: Aggregate::Sum(field.into()),
        }
    }

    /// Restricts the query to rows matching `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Checks the table, aggregate field, and filter fields are identifiers.
    pub fn validate(&self) -> StoreResult<()> {
        check_identifier(&self.table)?;
        if let Some(field) = self.aggregate.field() {
            check_identifier(field)?;
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for AggregateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.aggregate, self.table)?;
        if self.filter.is_some() {
            f.write_str(" (filtered)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn identifiers() {
        assert!(is_identifier("dim_film"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("film;"));
        assert!(!is_identifier("film actor"));
    }

    #[test]
    fn predicate_matching() {
        let row = Row::new()
            .with("film_id", 3)
            .with("last_update", datetime!(2006-02-15 05:03:42))
            .with("rating", Value::Null);

        assert!(Predicate::eq("film_id", 3).matches(&row));
        assert!(!Predicate::eq("film_id", 4).matches(&row));
        assert!(Predicate::gt("last_update", datetime!(2006-02-15 05:00:00)).matches(&row));
        assert!(!Predicate::gt("last_update", datetime!(2006-02-15 05:03:42)).matches(&row));
        assert!(!Predicate::eq("rating", Value::Null).matches(&row));
        assert!(!Predicate::eq("missing", 1).matches(&row));
        assert!(Predicate::And(vec![]).matches(&row));
    }

    #[test]
    fn aggregate_fold() {
        let a = Row::new().with("amount", 2.5);
        let b = Row::new().with("amount", 4);
        let c = Row::new().with("amount", Value::Null);
        let rows = vec![&a, &b, &c];

        assert!((Aggregate::Count.fold(&rows) - 3.0).abs() < f64::EPSILON);
        assert!((Aggregate::Sum("amount".into()).fold(&rows) - 6.5).abs() < f64::EPSILON);
        assert!((Aggregate::Min("amount".into()).fold(&rows) - 2.5).abs() < f64::EPSILON);
        assert!((Aggregate::Max("amount".into()).fold(&rows) - 4.0).abs() < f64::EPSILON);
        assert!((Aggregate::Avg("amount".into()).fold(&rows) - 3.25).abs() < f64::EPSILON);
        assert!(Aggregate::Sum("amount".into()).fold(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn query_validation_rejects_sql_fragments() {
        assert!(AggregateQuery::count("payment").validate().is_ok());
        assert!(AggregateQuery::count("payment;").validate().is_err());
        assert!(AggregateQuery::sum("payment", "SUM(amount)").validate().is_err());
        let filtered = AggregateQuery::count("rental").with_filter(Predicate::gt("bad field", 1));
        assert!(filtered.validate().is_err());
    }

    #[test]
    fn query_from_json() {
        let q: AggregateQuery = serde_json::from_str(
            r#"{"table":"payment","aggregate":{"sum":"amount"},"filter":{"gt":{"field":"payment_date","value":"2005-06-01 00:00:00"}}}"#,
        )
        .unwrap();
        assert_eq!(q.aggregate, Aggregate::Sum("amount".into()));
        assert!(q.filter.is_some());

        let q: AggregateQuery = serde_json::from_str(r#"{"table":"film"}"#).unwrap();
        assert_eq!(q.aggregate, Aggregate::Count);
    }
}
