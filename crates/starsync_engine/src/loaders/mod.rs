//! Per-entity loaders.
//!
//! A loader reads one source entity (optionally only rows changed since a
//! watermark), resolves whatever it references, and writes one target
//! table through [`crate::upsert`]. Loaders never touch the watermark
//! themselves; they report the largest timestamp they read and the
//! orchestrator records it once the loader has completed.

mod bridges;
mod dimensions;
mod facts;

pub use bridges::BridgeLoader;
pub use dimensions::{ActorLoader, CategoryLoader, CustomerLoader, FilmLoader, StoreLoader};
pub use facts::{PaymentLoader, RentalLoader};

use crate::calendar::CalendarCache;
use crate::error::EngineResult;
use crate::upsert::upsert;
use crate::watermark::max_timestamp;
use starsync_store::{Predicate, ReadStore, Row, TableDef, WriteStore};
use time::PrimitiveDateTime;

/// Stage of the pipeline a loader belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Dimensions, including the location dimensions.
    Dimension,
    /// Many-to-many bridges between dimensions.
    Bridge,
    /// Facts referencing dimensions and the calendar.
    Fact,
}

/// Stores and per-run state shared by the loaders of one run.
pub struct LoadContext<'a> {
    /// Operational source.
    pub source: &'a dyn ReadStore,
    /// Star schema target.
    pub target: &'a dyn WriteStore,
    /// Calendar keys already ensured in this run.
    pub calendar: CalendarCache,
    /// Run start; stands in for a missing `last_update`.
    pub now: PrimitiveDateTime,
}

impl<'a> LoadContext<'a> {
    /// Creates a context.
    pub fn new(source: &'a dyn ReadStore, target: &'a dyn WriteStore, now: PrimitiveDateTime) -> Self {
        Self {
            source,
            target,
            calendar: CalendarCache::new(),
            now,
        }
    }
}

/// Counters reported by one loader invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Source rows read.
    pub read: u64,
    /// Target records created or updated.
    pub written: u64,
    /// Bridge links that already existed.
    pub unchanged: u64,
    /// Rows dropped because a dependency was missing.
    pub skipped: u64,
    /// Largest value of the watermark field among the rows read.
    pub max_timestamp: Option<PrimitiveDateTime>,
}

/// A loader for one target table.
pub trait Loader: Send + Sync {
    /// Target table, also the watermark key.
    fn table(&self) -> &'static str;

    /// Pipeline stage.
    fn tier(&self) -> Tier;

    /// Source column compared against the watermark; `None` means the
    /// loader always reloads everything.
    fn watermark_field(&self) -> Option<&'static str>;

    /// Loads rows changed after `since` (all rows when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails or a source row is malformed.
    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome>;
}

/// Every loader in dependency order: independent dimensions, location
/// dimensions, bridges, facts.
pub fn standard_pipeline() -> Vec<Box<dyn Loader>> {
    vec![
        Box::new(FilmLoader),
        Box::new(ActorLoader),
        Box::new(CategoryLoader),
        Box::new(StoreLoader),
        Box::new(CustomerLoader),
        Box::new(BridgeLoader::film_actor()),
        Box::new(BridgeLoader::film_category()),
        Box::new(RentalLoader),
        Box::new(PaymentLoader),
    ]
}

/// Reads `table`, keeping only rows whose `field` is after `since`.
fn read_changed(
    source: &dyn ReadStore,
    table: &str,
    field: &str,
    since: Option<PrimitiveDateTime>,
) -> EngineResult<Vec<Row>> {
    let filter = since.map(|ts| Predicate::gt(field, ts));
    let rows = source.find(table, filter.as_ref())?;
    tracing::debug!(table, since = ?since, rows = rows.len(), "read source rows");
    Ok(rows)
}

/// Upserts one dimension record per source row.
fn upsert_dimension<F>(
    target: &dyn WriteStore,
    def: &TableDef,
    natural_key: &str,
    rows: &[Row],
    mut attributes: F,
) -> EngineResult<LoadOutcome>
where
    F: FnMut(&Row) -> EngineResult<Row>,
{
    let mut outcome = LoadOutcome {
        read: rows.len() as u64,
        max_timestamp: max_timestamp(rows, "last_update"),
        ..LoadOutcome::default()
    };
    for row in rows {
        let key = Row::new().with(natural_key, row.i64(natural_key)?);
        upsert(target, def, key, attributes(row)?)?;
        outcome.written += 1;
    }
    Ok(outcome)
}
