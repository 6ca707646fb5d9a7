//! Surrogate-key resolution and source lookups.

use crate::error::EngineResult;
use crate::schema;
use starsync_store::{Predicate, ReadStore, Row};
use std::collections::HashMap;

/// A dimension facts and bridges reference by surrogate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// `dim_film` by `film_id`.
    Film,
    /// `dim_actor` by `actor_id`.
    Actor,
    /// `dim_category` by `category_id`.
    Category,
    /// `dim_store` by `store_id`.
    Store,
    /// `dim_customer` by `customer_id`.
    Customer,
}

impl Dimension {
    /// Target table.
    pub fn table(self) -> &'static str {
        match self {
            Dimension::Film => schema::DIM_FILM,
            Dimension::Actor => schema::DIM_ACTOR,
            Dimension::Category => schema::DIM_CATEGORY,
            Dimension::Store => schema::DIM_STORE,
            Dimension::Customer => schema::DIM_CUSTOMER,
        }
    }

    /// Natural key column (same name in source and target).
    pub fn natural_key(self) -> &'static str {
        match self {
            Dimension::Film => "film_id",
            Dimension::Actor => "actor_id",
            Dimension::Category => "category_id",
            Dimension::Store => "store_id",
            Dimension::Customer => "customer_id",
        }
    }

    /// Surrogate key column.
    pub fn surrogate_key(self) -> &'static str {
        match self {
            Dimension::Film => "film_key",
            Dimension::Actor => "actor_key",
            Dimension::Category => "category_key",
            Dimension::Store => "store_key",
            Dimension::Customer => "customer_key",
        }
    }
}

/// Looks up the surrogate key of one dimension record. Never creates.
///
/// `Ok(None)` is an expected outcome: the caller skips the row.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn resolve<T: ReadStore + ?Sized>(
    target: &T,
    dimension: Dimension,
    natural_key: i64,
) -> EngineResult<Option<i64>> {
    let rows = target.find(
        dimension.table(),
        Some(&Predicate::eq(dimension.natural_key(), natural_key)),
    )?;
    match rows.first() {
        Some(row) => Ok(row.opt_i64(dimension.surrogate_key())?),
        None => Ok(None),
    }
}

/// Natural to surrogate key map of one dimension, loaded in one read.
#[derive(Debug, Clone)]
pub struct KeyMap {
    dimension: Dimension,
    keys: HashMap<i64, i64>,
}

impl KeyMap {
    /// Reads every record of the dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a key is not an integer.
    pub fn load<T: ReadStore + ?Sized>(target: &T, dimension: Dimension) -> EngineResult<Self> {
        let mut keys = HashMap::new();
        for row in target.find(dimension.table(), None)? {
            let natural = row.opt_i64(dimension.natural_key())?;
            let surrogate = row.opt_i64(dimension.surrogate_key())?;
            if let (Some(natural), Some(surrogate)) = (natural, surrogate) {
                keys.insert(natural, surrogate);
            }
        }
        Ok(Self { dimension, keys })
    }

    /// Surrogate key for a natural key.
    pub fn get(&self, natural_key: i64) -> Option<i64> {
        self.keys.get(&natural_key).copied()
    }

    /// Like [`KeyMap::get`] for an optional natural key.
    pub fn lookup(&self, natural_key: Option<i64>) -> Option<i64> {
        natural_key.and_then(|k| self.get(k))
    }

    /// The dimension this map covers.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the dimension is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Source rows of one table indexed by an integer id column.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    rows: HashMap<i64, Row>,
}

impl LookupTable {
    /// Reads every row of `table` and indexes it by `id_column`.
    ///
    /// Rows without an id are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or an id is not an integer.
    pub fn load<S: ReadStore + ?Sized>(source: &S, table: &str, id_column: &str) -> EngineResult<Self> {
        let mut rows = HashMap::new();
        for row in source.find(table, None)? {
            if let Some(id) = row.opt_i64(id_column)? {
                rows.insert(id, row);
            }
        }
        Ok(Self { rows })
    }

    /// Row with this id.
    pub fn get(&self, id: i64) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Like [`LookupTable::get`] for an optional id.
    pub fn lookup(&self, id: Option<i64>) -> Option<&Row> {
        id.and_then(|id| self.get(id))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
