//! Natural-key upsert.
//!
//! The single write primitive of the loaders: look the record up by its
//! natural key, then either create it or overwrite its attributes. The
//! surrogate key assigned by the store on creation is never touched again.

use crate::error::EngineResult;
use starsync_store::{Row, TableDef, WriteStore};

/// Record returned by [`upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// The record as stored, including its surrogate key.
    pub row: Row,
    /// True if the record did not exist before.
    pub created: bool,
}

/// Creates or updates the record of `def` identified by `natural_key`.
///
/// - Absent: inserts `natural_key` merged with `attributes`; the store
///   assigns the surrogate key.
/// - Present: overwrites every column in `attributes` (last writer wins)
///   and keeps the surrogate key.
///
/// Key columns inside `attributes` are ignored, so an update can neither
/// move a record to another natural key nor reassign its surrogate key.
/// Applying the same input twice leaves the store unchanged.
///
/// One read plus one write per call.
///
/// # Errors
///
/// Returns an error if a natural key column is missing or null, or if the
/// store fails.
pub fn upsert<T: WriteStore + ?Sized>(
    target: &T,
    def: &TableDef,
    natural_key: Row,
    attributes: Row,
) -> EngineResult<Upserted> {
    let identity = def.identity(&natural_key)?;
    let attributes: Row = attributes
        .into_iter()
        .filter(|(column, _)| {
            def.surrogate_key.as_deref() != Some(column.as_str())
                && !def.natural_key.contains(column)
        })
        .collect();

    match target.find_one(&def.name, &identity)? {
        None => {
            let mut row = natural_key;
            row.merge(&attributes);
            let row = target.insert(&def.name, row)?;
            Ok(Upserted { row, created: true })
        }
        Some(mut existing) => {
            target.update(&def.name, &identity, &attributes)?;
            existing.merge(&attributes);
            Ok(Upserted {
                row: existing,
                created: false,
            })
        }
    }
}

/// Inserts `identity` into `def` unless a record with that natural key
/// already exists. Never modifies an existing record.
///
/// Returns true if a record was inserted.
///
/// # Errors
///
/// Returns an error if a natural key column is missing or the store fails.
pub fn insert_if_absent<T: WriteStore + ?Sized>(
    target: &T,
    def: &TableDef,
    identity: Row,
) -> EngineResult<bool> {
    let predicate = def.identity(&identity)?;
    if target.find_one(&def.name, &predicate)?.is_some() {
        return Ok(false);
    }
    target.insert(&def.name, identity)?;
    Ok(true)
}
