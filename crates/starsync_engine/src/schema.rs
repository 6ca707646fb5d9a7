//! Star schema table definitions and source table names.

use starsync_store::{ColumnType, IndexDef, TableDef};

/// City/country placeholder used when the address chain of a store or
/// customer is incomplete. A lossy-join fallback, not a data-quality flag.
pub const UNKNOWN: &str = "Unknown";

/// Calendar dimension.
pub const DIM_DATE: &str = "dim_date";
/// Film dimension.
pub const DIM_FILM: &str = "dim_film";
/// Actor dimension.
pub const DIM_ACTOR: &str = "dim_actor";
/// Category dimension.
pub const DIM_CATEGORY: &str = "dim_category";
/// Store dimension.
pub const DIM_STORE: &str = "dim_store";
/// Customer dimension.
pub const DIM_CUSTOMER: &str = "dim_customer";
/// Film to actor bridge.
pub const BRIDGE_FILM_ACTOR: &str = "bridge_film_actor";
/// Film to category bridge.
pub const BRIDGE_FILM_CATEGORY: &str = "bridge_film_category";
/// Rental fact.
pub const FACT_RENTAL: &str = "fact_rental";
/// Payment fact.
pub const FACT_PAYMENT: &str = "fact_payment";
/// Watermark table.
pub const SYNC_STATE: &str = "sync_state";

/// Source (operational) table names.
pub mod source {
    #![allow(missing_docs)]

    pub const FILM: &str = "film";
    pub const LANGUAGE: &str = "language";
    pub const ACTOR: &str = "actor";
    pub const CATEGORY: &str = "category";
    pub const FILM_ACTOR: &str = "film_actor";
    pub const FILM_CATEGORY: &str = "film_category";
    pub const STORE: &str = "store";
    pub const ADDRESS: &str = "address";
    pub const CITY: &str = "city";
    pub const COUNTRY: &str = "country";
    pub const CUSTOMER: &str = "customer";
    pub const STAFF: &str = "staff";
    pub const INVENTORY: &str = "inventory";
    pub const RENTAL: &str = "rental";
    pub const PAYMENT: &str = "payment";
}

/// `dim_date`: keyed by `YYYYMMDD`, no surrogate.
pub fn dim_date() -> TableDef {
    TableDef::new(DIM_DATE)
        .natural_key(&["date_key"])
        .column("date_key", ColumnType::Integer)
        .column("date", ColumnType::Date)
        .column("year", ColumnType::Integer)
        .column("quarter", ColumnType::Integer)
        .column("month", ColumnType::Integer)
        .column("day_of_month", ColumnType::Integer)
        .column("day_of_week", ColumnType::Integer)
        .column("is_weekend", ColumnType::Integer)
}

/// `dim_film`.
pub fn dim_film() -> TableDef {
    TableDef::new(DIM_FILM)
        .surrogate("film_key")
        .natural_key(&["film_id"])
        .column("film_id", ColumnType::Integer)
        .column("title", ColumnType::Text)
        .nullable("rating", ColumnType::Text)
        .nullable("length", ColumnType::Integer)
        .nullable("language", ColumnType::Text)
        .nullable("release_year", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `dim_actor`.
pub fn dim_actor() -> TableDef {
    TableDef::new(DIM_ACTOR)
        .surrogate("actor_key")
        .natural_key(&["actor_id"])
        .column("actor_id", ColumnType::Integer)
        .column("first_name", ColumnType::Text)
        .column("last_name", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `dim_category`.
pub fn dim_category() -> TableDef {
    TableDef::new(DIM_CATEGORY)
        .surrogate("category_key")
        .natural_key(&["category_id"])
        .column("category_id", ColumnType::Integer)
        .column("name", ColumnType::Text)
        .column("last_update", ColumnType::Timestamp)
}

/// `dim_store`.
pub fn dim_store() -> TableDef {
    TableDef::new(DIM_STORE)
        .surrogate("store_key")
        .natural_key(&["store_id"])
        .column("store_id", ColumnType::Integer)
        .nullable("city", ColumnType::Text)
        .nullable("country", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `dim_customer`.
pub fn dim_customer() -> TableDef {
    TableDef::new(DIM_CUSTOMER)
        .surrogate("customer_key")
        .natural_key(&["customer_id"])
        .column("customer_id", ColumnType::Integer)
        .column("first_name", ColumnType::Text)
        .column("last_name", ColumnType::Text)
        .column("active", ColumnType::Integer)
        .column("city", ColumnType::Text)
        .column("country", ColumnType::Text)
        .column("last_update", ColumnType::Timestamp)
}

/// `bridge_film_actor`.
pub fn bridge_film_actor() -> TableDef {
    TableDef::new(BRIDGE_FILM_ACTOR)
        .natural_key(&["film_key", "actor_key"])
        .column("film_key", ColumnType::Integer)
        .column("actor_key", ColumnType::Integer)
}

/// `bridge_film_category`.
pub fn bridge_film_category() -> TableDef {
    TableDef::new(BRIDGE_FILM_CATEGORY)
        .natural_key(&["film_key", "category_key"])
        .column("film_key", ColumnType::Integer)
        .column("category_key", ColumnType::Integer)
}

/// `fact_rental`.
pub fn fact_rental() -> TableDef {
    TableDef::new(FACT_RENTAL)
        .surrogate("fact_rental_key")
        .natural_key(&["rental_id"])
        .column("rental_id", ColumnType::Integer)
        .column("date_key_rented", ColumnType::Integer)
        .nullable("date_key_returned", ColumnType::Integer)
        .column("film_key", ColumnType::Integer)
        .column("store_key", ColumnType::Integer)
        .column("customer_key", ColumnType::Integer)
        .column("staff_id", ColumnType::Integer)
        .nullable("rental_duration_days", ColumnType::Integer)
}

/// `fact_payment`.
pub fn fact_payment() -> TableDef {
    TableDef::new(FACT_PAYMENT)
        .surrogate("fact_payment_key")
        .natural_key(&["payment_id"])
        .column("payment_id", ColumnType::Integer)
        .column("date_key_paid", ColumnType::Integer)
        .column("customer_key", ColumnType::Integer)
        .column("store_key", ColumnType::Integer)
        .column("staff_id", ColumnType::Integer)
        .column("amount", ColumnType::Real)
}

/// `sync_state`: one watermark per logical table.
pub fn sync_state() -> TableDef {
    TableDef::new(SYNC_STATE)
        .surrogate("id")
        .natural_key(&["table_name"])
        .column("table_name", ColumnType::Text)
        .nullable("last_updated", ColumnType::Timestamp)
}

/// Every star schema table, dimensions first.
pub fn target_tables() -> Vec<TableDef> {
    vec![
        dim_date(),
        dim_film(),
        dim_actor(),
        dim_category(),
        dim_store(),
        dim_customer(),
        bridge_film_actor(),
        bridge_film_category(),
        fact_rental(),
        fact_payment(),
    ]
}

/// Secondary indexes for the join and lookup paths of the loaders and of
/// typical star queries. Natural keys are already unique-indexed.
pub fn recommended_indexes() -> Vec<IndexDef> {
    vec![
        IndexDef::new("idx_bridge_film_actor_actor", BRIDGE_FILM_ACTOR, &["actor_key"]),
        IndexDef::new("idx_bridge_film_category_category", BRIDGE_FILM_CATEGORY, &["category_key"]),
        IndexDef::new("idx_fact_rental_date_rented", FACT_RENTAL, &["date_key_rented"]),
        IndexDef::new("idx_fact_rental_film", FACT_RENTAL, &["film_key"]),
        IndexDef::new("idx_fact_rental_customer", FACT_RENTAL, &["customer_key"]),
        IndexDef::new("idx_fact_payment_date_paid", FACT_PAYMENT, &["date_key_paid"]),
        IndexDef::new("idx_fact_payment_customer", FACT_PAYMENT, &["customer_key"]),
        IndexDef::new("idx_fact_payment_store", FACT_PAYMENT, &["store_key"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_definitions_validate() {
        for def in target_tables().iter().chain(std::iter::once(&sync_state())) {
            def.validate().unwrap();
        }
        for index in recommended_indexes() {
            index.validate().unwrap();
            let table = target_tables()
                .into_iter()
                .find(|t| t.name == index.table)
                .unwrap();
            assert!(index.columns.iter().all(|c| table.has_column(c)));
        }
    }

    #[test]
    fn bridges_have_no_surrogate() {
        assert!(bridge_film_actor().surrogate_key.is_none());
        assert!(bridge_film_category().surrogate_key.is_none());
        assert!(dim_date().surrogate_key.is_none());
    }
}
