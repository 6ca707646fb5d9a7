//! Source table definitions.
//!
//! Source tables carry no surrogate key; each is identified by its own id
//! column (or id pair, for link tables). Every attribute the loaders do not
//! strictly need is nullable so fixtures can stay small.

use starsync_store::{ColumnType, TableDef};

fn entity(name: &str, id: &str) -> TableDef {
    TableDef::new(name)
        .natural_key(&[id])
        .column(id, ColumnType::Integer)
}

/// `language`.
pub fn language() -> TableDef {
    entity("language", "language_id")
        .column("name", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `film`.
pub fn film() -> TableDef {
    entity("film", "film_id")
        .column("title", ColumnType::Text)
        .nullable("description", ColumnType::Text)
        .nullable("release_year", ColumnType::Integer)
        .nullable("language_id", ColumnType::Integer)
        .nullable("length", ColumnType::Integer)
        .nullable("rating", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `actor`.
pub fn actor() -> TableDef {
    entity("actor", "actor_id")
        .column("first_name", ColumnType::Text)
        .column("last_name", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `category`.
pub fn category() -> TableDef {
    entity("category", "category_id")
        .column("name", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `film_actor`.
pub fn film_actor() -> TableDef {
    TableDef::new("film_actor")
        .natural_key(&["film_id", "actor_id"])
        .column("film_id", ColumnType::Integer)
        .column("actor_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `film_category`.
pub fn film_category() -> TableDef {
    TableDef::new("film_category")
        .natural_key(&["film_id", "category_id"])
        .column("film_id", ColumnType::Integer)
        .column("category_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `country`.
pub fn country() -> TableDef {
    entity("country", "country_id")
        .column("country", ColumnType::Text)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `city`.
pub fn city() -> TableDef {
    entity("city", "city_id")
        .column("city", ColumnType::Text)
        .nullable("country_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `address`.
pub fn address() -> TableDef {
    entity("address", "address_id")
        .nullable("address", ColumnType::Text)
        .nullable("city_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `store`.
pub fn store() -> TableDef {
    entity("store", "store_id")
        .nullable("manager_staff_id", ColumnType::Integer)
        .nullable("address_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `staff`.
pub fn staff() -> TableDef {
    entity("staff", "staff_id")
        .nullable("first_name", ColumnType::Text)
        .nullable("last_name", ColumnType::Text)
        .column("store_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `customer`.
pub fn customer() -> TableDef {
    entity("customer", "customer_id")
        .nullable("store_id", ColumnType::Integer)
        .column("first_name", ColumnType::Text)
        .column("last_name", ColumnType::Text)
        .nullable("email", ColumnType::Text)
        .nullable("address_id", ColumnType::Integer)
        .column("active", ColumnType::Integer)
        .nullable("create_date", ColumnType::Timestamp)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `inventory`.
pub fn inventory() -> TableDef {
    entity("inventory", "inventory_id")
        .column("film_id", ColumnType::Integer)
        .column("store_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `rental`.
pub fn rental() -> TableDef {
    entity("rental", "rental_id")
        .column("rental_date", ColumnType::Timestamp)
        .column("inventory_id", ColumnType::Integer)
        .column("customer_id", ColumnType::Integer)
        .nullable("return_date", ColumnType::Timestamp)
        .column("staff_id", ColumnType::Integer)
        .nullable("last_update", ColumnType::Timestamp)
}

/// `payment`.
pub fn payment() -> TableDef {
    entity("payment", "payment_id")
        .column("customer_id", ColumnType::Integer)
        .column("staff_id", ColumnType::Integer)
        .nullable("rental_id", ColumnType::Integer)
        .column("amount", ColumnType::Real)
        .column("payment_date", ColumnType::Timestamp)
        .nullable("last_update", ColumnType::Timestamp)
}

/// Every source table, referenced tables first.
pub fn source_tables() -> Vec<TableDef> {
    vec![
        language(),
        film(),
        actor(),
        category(),
        film_actor(),
        film_category(),
        country(),
        city(),
        address(),
        store(),
        staff(),
        customer(),
        inventory(),
        rental(),
        payment(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_definitions_are_valid() {
        for def in source_tables() {
            def.validate().unwrap();
            assert!(def.surrogate_key.is_none(), "{} has a surrogate", def.name);
        }
    }
}
