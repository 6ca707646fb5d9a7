//! Source fixtures.
//!
//! [`SakilaFixture`] builds a small operational dataset and seeds it into
//! any [`WriteStore`]. [`SakilaFixture::standard`] is a consistent dataset
//! in which every reference resolves.

use crate::source_schema::source_tables;
use starsync_store::{
    parse_timestamp, InMemoryStore, ReadStore, Row, SqliteStore, StoreResult, WriteStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use time::PrimitiveDateTime;

/// `last_update` used by every row of the standard dataset.
pub const LAST_UPDATE: &str = "2006-02-15 04:34:33";

/// Parses a `YYYY-MM-DD HH:MM:SS` timestamp.
///
/// # Panics
///
/// Panics if `text` is not a timestamp.
pub fn ts(text: &str) -> PrimitiveDateTime {
    parse_timestamp(text).unwrap_or_else(|| panic!("invalid timestamp: {text}"))
}

/// A Sakila-shaped source dataset.
#[derive(Debug, Clone, Default)]
pub struct SakilaFixture {
    tables: BTreeMap<String, Vec<Row>>,
}

impl SakilaFixture {
    /// An empty dataset. Seeding it still declares every source table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Three films, three actors, two categories, two stores in two
    /// countries, three customers (one at an address whose city is
    /// missing), four rentals and four payments.
    pub fn standard() -> Self {
        Self::new()
            .language(1, "English")
            .country(1, "Canada")
            .country(2, "Australia")
            .city(1, "Lethbridge", 1)
            .city(2, "Woodridge", 2)
            .address(1, Some(1))
            .address(2, Some(2))
            .address(3, Some(99))
            .store(1, Some(1))
            .store(2, Some(2))
            .staff(1, 1)
            .staff(2, 2)
            .film(1, "ACADEMY DINOSAUR")
            .film(2, "ACE GOLDFINGER")
            .film(3, "ADAPTATION HOLES")
            .actor(1, "PENELOPE", "GUINESS")
            .actor(2, "NICK", "WAHLBERG")
            .actor(3, "ED", "CHASE")
            .category(1, "Action")
            .category(2, "Animation")
            .film_actor(1, 1)
            .film_actor(1, 2)
            .film_actor(2, 3)
            .film_actor(3, 1)
            .film_category(1, 2)
            .film_category(2, 1)
            .film_category(3, 1)
            .customer(1, "MARY", "SMITH", Some(1))
            .customer(2, "PATRICIA", "JOHNSON", Some(2))
            .customer(3, "LINDA", "WILLIAMS", Some(3))
            .inventory(1, 1, 1)
            .inventory(2, 2, 1)
            .inventory(3, 3, 2)
            .rental(1, 1, 1, 1, "2005-05-24 22:53:30", Some("2005-05-26 22:04:30"))
            .rental(2, 2, 2, 1, "2005-05-24 22:54:33", Some("2005-05-28 19:40:33"))
            .rental(3, 3, 3, 2, "2005-05-24 23:03:39", Some("2005-06-01 22:12:39"))
            .rental(4, 1, 2, 2, "2005-05-25 00:00:40", None)
            .payment(1, 1, 1, 2.99, "2005-05-25 11:30:37")
            .payment(2, 1, 1, 0.99, "2005-05-28 10:35:23")
            .payment(3, 2, 2, 5.99, "2005-06-15 00:54:12")
            .payment(4, 3, 2, 0.99, "2005-06-15 18:02:53")
    }

    /// Adds a row to any table.
    #[must_use]
    pub fn with_row(mut self, table: &str, row: Row) -> Self {
        self.tables.entry(table.to_string()).or_default().push(row);
        self
    }

    /// Rows of one table.
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of rows in one table.
    pub fn count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Adds a language.
    #[must_use]
    pub fn language(self, id: i64, name: &str) -> Self {
        self.with_row(
            "language",
            Row::new()
                .with("language_id", id)
                .with("name", name)
                .with("last_update", ts(LAST_UPDATE)),
        )
    }

    /// Adds an English, PG, 90-minute film.
    #[must_use]
    pub fn film(self, id: i64, title: &str) -> Self {
        self.film_updated(id, title, ts(LAST_UPDATE))
    }

    /// Adds a film with an explicit `last_update`.
    #[must_use]
    pub fn film_updated(self, id: i64, title: &str, last_update: PrimitiveDateTime) -> Self {
        self.with_row(
            "film",
            Row::new()
                .with("film_id", id)
                .with("title", title)
                .with("release_year", 2006)
                .with("language_id", 1)
                .with("length", 90)
                .with("rating", "PG")
                .with("last_update", last_update),
        )
    }

    /// Adds an actor.
    #[must_use]
    pub fn actor(self, id: i64, first_name: &str, last_name: &str) -> Self {
        self.actor_updated(id, first_name, last_name, ts(LAST_UPDATE))
    }

    /// Adds an actor with an explicit `last_update`.
    #[must_use]
    pub fn actor_updated(
        self,
        id: i64,
        first_name: &str,
        last_name: &str,
        last_update: PrimitiveDateTime,
    ) -> Self {
        self.with_row(
            "actor",
            Row::new()
                .with("actor_id", id)
                .with("first_name", first_name)
                .with("last_name", last_name)
                .with("last_update", last_update),
        )
    }

    /// Adds a category.
    #[must_use]
    pub fn category(self, id: i64, name: &str) -> Self {
        self.with_row(
            "category",
            Row::new()
                .with("category_id", id)
                .with("name", name)
                .with("last_update", ts(LAST_UPDATE)),
        )
    }

    /// Links a film and an actor.
    #[must_use]
    pub fn film_actor(self, film_id: i64, actor_id: i64) -> Self {
        self.with_row(
            "film_actor",
            Row::new().with("film_id", film_id).with("actor_id", actor_id),
        )
    }

    /// Links a film and a category.
    #[must_use]
    pub fn film_category(self, film_id: i64, category_id: i64) -> Self {
        self.with_row(
            "film_category",
            Row::new()
                .with("film_id", film_id)
                .with("category_id", category_id),
        )
    }

    /// Adds a country.
    #[must_use]
    pub fn country(self, id: i64, name: &str) -> Self {
        self.with_row("country", Row::new().with("country_id", id).with("country", name))
    }

    /// Adds a city.
    #[must_use]
    pub fn city(self, id: i64, name: &str, country_id: i64) -> Self {
        self.with_row(
            "city",
            Row::new()
                .with("city_id", id)
                .with("city", name)
                .with("country_id", country_id),
        )
    }

    /// Adds an address.
    #[must_use]
    pub fn address(self, id: i64, city_id: Option<i64>) -> Self {
        self.with_row(
            "address",
            Row::new()
                .with("address_id", id)
                .with("address", format!("{id} Main Street"))
                .with("city_id", city_id),
        )
    }

    /// Adds a store.
    #[must_use]
    pub fn store(self, id: i64, address_id: Option<i64>) -> Self {
        self.with_row(
            "store",
            Row::new()
                .with("store_id", id)
                .with("address_id", address_id)
                .with("last_update", ts(LAST_UPDATE)),
        )
    }

    /// Adds a staff member working at `store_id`.
    #[must_use]
    pub fn staff(self, id: i64, store_id: i64) -> Self {
        self.with_row(
            "staff",
            Row::new().with("staff_id", id).with("store_id", store_id),
        )
    }

    /// Adds an active customer.
    #[must_use]
    pub fn customer(self, id: i64, first_name: &str, last_name: &str, address_id: Option<i64>) -> Self {
        self.with_row(
            "customer",
            Row::new()
                .with("customer_id", id)
                .with("store_id", 1)
                .with("first_name", first_name)
                .with("last_name", last_name)
                .with("address_id", address_id)
                .with("active", 1)
                .with("last_update", ts(LAST_UPDATE)),
        )
    }

    /// Adds an inventory item.
    #[must_use]
    pub fn inventory(self, id: i64, film_id: i64, store_id: i64) -> Self {
        self.with_row(
            "inventory",
            Row::new()
                .with("inventory_id", id)
                .with("film_id", film_id)
                .with("store_id", store_id),
        )
    }

    /// Adds a rental.
    #[must_use]
    pub fn rental(
        self,
        id: i64,
        inventory_id: i64,
        customer_id: i64,
        staff_id: i64,
        rented: &str,
        returned: Option<&str>,
    ) -> Self {
        self.with_row(
            "rental",
            Row::new()
                .with("rental_id", id)
                .with("rental_date", ts(rented))
                .with("inventory_id", inventory_id)
                .with("customer_id", customer_id)
                .with("return_date", returned.map(ts))
                .with("staff_id", staff_id),
        )
    }

    /// Adds a payment.
    #[must_use]
    pub fn payment(self, id: i64, customer_id: i64, staff_id: i64, amount: f64, paid: &str) -> Self {
        self.with_row(
            "payment",
            Row::new()
                .with("payment_id", id)
                .with("customer_id", customer_id)
                .with("staff_id", staff_id)
                .with("amount", amount)
                .with("payment_date", ts(paid)),
        )
    }

    /// Declares every source table in `store` and inserts the dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be created or a row violates its
    /// definition.
    pub fn seed<T: WriteStore + ?Sized>(&self, store: &T) -> StoreResult<()> {
        for def in source_tables() {
            store.ensure_table(&def)?;
        }
        for (table, rows) in &self.tables {
            for row in rows {
                store.insert(table, row.clone())?;
            }
        }
        Ok(())
    }

    /// A fresh in-memory store holding the dataset.
    ///
    /// # Panics
    ///
    /// Panics if seeding fails.
    pub fn in_memory(&self) -> InMemoryStore {
        let store = InMemoryStore::new();
        self.seed(&store).expect("Failed to seed in-memory source");
        store
    }

    /// Writes the dataset to a SQLite file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or seeded.
    pub fn write_sqlite(&self, path: &Path) -> StoreResult<()> {
        let store = SqliteStore::open(path)?;
        self.seed(&store)?;
        store.close()
    }
}

/// A SQLite source file in a temporary directory, removed on drop.
pub struct TempSource {
    /// Path of the source database.
    pub path: PathBuf,
    dir: TempDir,
}

impl TempSource {
    /// Writes `fixture` to `source.db` in a new temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or database cannot be created.
    pub fn new(fixture: &SakilaFixture) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("source.db");
        fixture
            .write_sqlite(&path)
            .expect("Failed to write SQLite source");
        Self { path, dir }
    }

    /// A path for another database next to the source.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
