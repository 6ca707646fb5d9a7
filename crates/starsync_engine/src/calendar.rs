//! Calendar dimension generation.

use crate::error::EngineResult;
use crate::schema;
use starsync_store::{Predicate, Row, StoreResult, WriteStore};
use std::collections::BTreeSet;
use time::{Date, PrimitiveDateTime};

/// Returns the integer key `year * 10000 + month * 100 + day`.
pub fn date_key(date: Date) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(u8::from(date.month())) * 100 + i64::from(date.day())
}

/// Attributes of a `dim_date` record, derived from the date alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarAttributes {
    /// `YYYYMMDD`.
    pub date_key: i64,
    /// The calendar date.
    pub date: Date,
    /// Year.
    pub year: i32,
    /// Quarter, 1 to 4.
    pub quarter: u8,
    /// Month, 1 to 12.
    pub month: u8,
    /// Day of month, 1 to 31.
    pub day_of_month: u8,
    /// Day of week, 0 = Sunday.
    pub day_of_week: u8,
    /// Saturday or Sunday.
    pub is_weekend: bool,
}

impl CalendarAttributes {
    /// Derives the attributes of `date`.
    pub fn for_date(date: Date) -> Self {
        let month = u8::from(date.month());
        let day_of_week = date.weekday().number_days_from_sunday();
        Self {
            date_key: date_key(date),
            date,
            year: date.year(),
            quarter: (month - 1) / 3 + 1,
            month,
            day_of_month: date.day(),
            day_of_week,
            is_weekend: day_of_week == 0 || day_of_week == 6,
        }
    }

    fn to_row(self) -> Row {
        Row::new()
            .with("date_key", self.date_key)
            .with("date", self.date)
            .with("year", i64::from(self.year))
            .with("quarter", i64::from(self.quarter))
            .with("month", i64::from(self.month))
            .with("day_of_month", i64::from(self.day_of_month))
            .with("day_of_week", i64::from(self.day_of_week))
            .with("is_weekend", self.is_weekend)
    }

    /// Reads a stored `dim_date` record.
    ///
    /// Only the date is read back; every other attribute is a function of it.
    fn from_row(row: &Row) -> StoreResult<Self> {
        let date = match row.opt_date("date")? {
            Some(date) => date,
            None => row.timestamp("date")?.date(),
        };
        Ok(Self::for_date(date))
    }
}

/// Ensures the `dim_date` record for `date` exists and returns it.
///
/// An existing record is returned unchanged; calendar rows are immutable.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn ensure_date<T: WriteStore + ?Sized>(target: &T, date: Date) -> EngineResult<CalendarAttributes> {
    let key = date_key(date);
    if let Some(existing) = target.find_one(schema::DIM_DATE, &Predicate::eq("date_key", key))? {
        return Ok(CalendarAttributes::from_row(&existing)?);
    }
    let attributes = CalendarAttributes::for_date(date);
    target.insert(schema::DIM_DATE, attributes.to_row())?;
    Ok(attributes)
}

/// Date keys already ensured during one loader run.
///
/// Facts reference the same few hundred dates over and over; the cache
/// turns all but the first [`ensure_date`] per date into a set lookup.
#[derive(Debug, Default)]
pub struct CalendarCache {
    known: BTreeSet<i64>,
}

impl CalendarCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures the calendar record for the date of `ts` and returns its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn ensure<T: WriteStore + ?Sized>(&mut self, target: &T, ts: PrimitiveDateTime) -> EngineResult<i64> {
        let key = date_key(ts.date());
        if !self.known.contains(&key) {
            ensure_date(target, ts.date())?;
            self.known.insert(key);
        }
        Ok(key)
    }

    /// Number of distinct dates seen.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Returns true if no date was ensured yet.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use starsync_store::{InMemoryStore, ReadStore};
    use starsync_testkit::generators::arb_date;
    use time::macros::{date, datetime};

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.ensure_table(&schema::dim_date()).unwrap();
        store
    }

    #[test]
    fn derives_attributes() {
        // Saturday
        let sat = CalendarAttributes::for_date(date!(2005-05-28));
        assert_eq!(sat.date_key, 20_050_528);
        assert_eq!(sat.quarter, 2);
        assert_eq!(sat.day_of_week, 6);
        assert!(sat.is_weekend);

        let sun = CalendarAttributes::for_date(date!(2005-05-29));
        assert_eq!(sun.day_of_week, 0);
        assert!(sun.is_weekend);

        let mon = CalendarAttributes::for_date(date!(2005-05-30));
        assert_eq!(mon.day_of_week, 1);
        assert!(!mon.is_weekend);

        assert_eq!(CalendarAttributes::for_date(date!(2006-01-01)).quarter, 1);
        assert_eq!(CalendarAttributes::for_date(date!(2006-03-31)).quarter, 1);
        assert_eq!(CalendarAttributes::for_date(date!(2006-04-01)).quarter, 2);
        assert_eq!(CalendarAttributes::for_date(date!(2006-12-31)).quarter, 4);
    }

    #[test]
    fn ensure_date_is_idempotent() {
        let store = store();
        let first = ensure_date(&store, date!(2005-07-08)).unwrap();
        let second = ensure_date(&store, date!(2005-07-08)).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.rows("dim_date").len(), 1);

        let row = store
            .find_one("dim_date", &Predicate::eq("date_key", 20_050_708))
            .unwrap()
            .unwrap();
        assert_eq!(row.i64("day_of_week").unwrap(), 5);
        assert_eq!(row.i64("is_weekend").unwrap(), 0);
    }

    #[test]
    fn cache_skips_repeat_lookups() {
        let store = store();
        let mut cache = CalendarCache::new();
        let a = cache.ensure(&store, datetime!(2005-05-24 22:53:30)).unwrap();
        let b = cache.ensure(&store, datetime!(2005-05-24 23:03:39)).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.find("dim_date", None).unwrap().len(), 1);
    }

    proptest! {
        #[test]
        fn same_date_same_record(d in arb_date()) {
            let store = store();
            let first = ensure_date(&store, d).unwrap();
            let again = ensure_date(&store, d).unwrap();
            prop_assert_eq!(first, again);
            prop_assert_eq!(store.rows("dim_date").len(), 1);
            prop_assert_eq!(first.date_key / 10_000, i64::from(d.year()));
            prop_assert!((1..=4).contains(&first.quarter));
            prop_assert_eq!(first.is_weekend, first.day_of_week == 0 || first.day_of_week == 6);
        }
    }
}
