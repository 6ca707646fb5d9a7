//! Sync-state (watermark) tracking.
//!
//! One `sync_state` record per logical table holds the largest source
//! timestamp that table has ingested. No record, or one whose timestamp
//! cannot be read, means "load everything".

use crate::error::EngineResult;
use crate::schema;
use crate::upsert::upsert;
use starsync_store::{Predicate, Row, Value, WriteStore};
use time::PrimitiveDateTime;

/// Reads and writes watermarks in the target store.
#[derive(Debug)]
pub struct SyncStateTracker<'a, T: WriteStore + ?Sized> {
    target: &'a T,
}

impl<'a, T: WriteStore + ?Sized> SyncStateTracker<'a, T> {
    /// Creates a tracker over `target`.
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    /// Creates the `sync_state` table if needed (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn ensure(&self) -> EngineResult<()> {
        self.target.ensure_table(&schema::sync_state())?;
        Ok(())
    }

    /// Returns the watermark of `table`, if one is recorded and readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_watermark(&self, table: &str) -> EngineResult<Option<PrimitiveDateTime>> {
        let record = self
            .target
            .find_one(schema::SYNC_STATE, &Predicate::eq("table_name", table))?;
        Ok(record
            .as_ref()
            .and_then(|r| r.get("last_updated"))
            .and_then(Value::as_timestamp))
    }

    /// Records `ts` as the watermark of `table`, unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn set_watermark(&self, table: &str, ts: PrimitiveDateTime) -> EngineResult<()> {
        upsert(
            self.target,
            &schema::sync_state(),
            Row::new().with("table_name", table),
            Row::new().with("last_updated", ts),
        )?;
        Ok(())
    }

    /// Records `ts` only if it is later than the current watermark.
    ///
    /// Returns true if the watermark moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn advance_watermark(&self, table: &str, ts: PrimitiveDateTime) -> EngineResult<bool> {
        if let Some(current) = self.get_watermark(table)? {
            if ts <= current {
                return Ok(false);
            }
        }
        self.set_watermark(table, ts)?;
        Ok(true)
    }
}

/// Largest readable timestamp in `field` across `rows`.
///
/// Null, missing and unparsable values are ignored; no rows yields `None`.
pub fn max_timestamp(rows: &[Row], field: &str) -> Option<PrimitiveDateTime> {
    rows.iter()
        .filter_map(|row| row.get(field).and_then(Value::as_timestamp))
        .max()
}
