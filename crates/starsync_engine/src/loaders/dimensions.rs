//! Dimension loaders.

use super::{read_changed, upsert_dimension, LoadContext, LoadOutcome, Loader, Tier};
use crate::error::EngineResult;
use crate::resolver::LookupTable;
use crate::schema::{self, source, UNKNOWN};
use starsync_store::{ReadStore, Row};
use time::PrimitiveDateTime;

fn last_update(row: &Row, now: PrimitiveDateTime) -> EngineResult<PrimitiveDateTime> {
    Ok(row.opt_timestamp("last_update")?.unwrap_or(now))
}

/// `film` + `language` into `dim_film`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilmLoader;

impl Loader for FilmLoader {
    fn table(&self) -> &'static str {
        schema::DIM_FILM
    }

    fn tier(&self) -> Tier {
        Tier::Dimension
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("last_update")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let films = read_changed(ctx.source, source::FILM, "last_update", since)?;
        let languages = LookupTable::load(ctx.source, source::LANGUAGE, "language_id")?;
        let now = ctx.now;

        upsert_dimension(ctx.target, &schema::dim_film(), "film_id", &films, |film| {
            let language = languages
                .lookup(film.opt_i64("language_id")?)
                .map(|l| l.text("name"))
                .transpose()?;
            Ok(Row::new()
                .with("title", film.text("title")?)
                .with("rating", film.opt_text("rating")?)
                .with("length", film.opt_i64("length")?)
                .with("language", language)
                .with("release_year", film.opt_i64("release_year")?)
                .with("last_update", last_update(film, now)?))
        })
    }
}

/// `actor` into `dim_actor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorLoader;

impl Loader for ActorLoader {
    fn table(&self) -> &'static str {
        schema::DIM_ACTOR
    }

    fn tier(&self) -> Tier {
        Tier::Dimension
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("last_update")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let actors = read_changed(ctx.source, source::ACTOR, "last_update", since)?;
        let now = ctx.now;

        upsert_dimension(ctx.target, &schema::dim_actor(), "actor_id", &actors, |actor| {
            Ok(Row::new()
                .with("first_name", actor.text("first_name")?)
                .with("last_name", actor.text("last_name")?)
                .with("last_update", last_update(actor, now)?))
        })
    }
}

/// `category` into `dim_category`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryLoader;

impl Loader for CategoryLoader {
    fn table(&self) -> &'static str {
        schema::DIM_CATEGORY
    }

    fn tier(&self) -> Tier {
        Tier::Dimension
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("last_update")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let categories = read_changed(ctx.source, source::CATEGORY, "last_update", since)?;
        let now = ctx.now;

        upsert_dimension(
            ctx.target,
            &schema::dim_category(),
            "category_id",
            &categories,
            |category| {
                Ok(Row::new()
                    .with("name", category.text("name")?)
                    .with("last_update", last_update(category, now)?))
            },
        )
    }
}

/// Address, city and country lookups used to place stores and customers.
struct Locations {
    addresses: LookupTable,
    cities: LookupTable,
    countries: LookupTable,
}

impl Locations {
    fn load(source: &dyn ReadStore) -> EngineResult<Self> {
        Ok(Self {
            addresses: LookupTable::load(source, source::ADDRESS, "address_id")?,
            cities: LookupTable::load(source, source::CITY, "city_id")?,
            countries: LookupTable::load(source, source::COUNTRY, "country_id")?,
        })
    }

    /// City and country of an address, [`UNKNOWN`] wherever a link is missing.
    fn place(&self, address_id: Option<i64>) -> EngineResult<(String, String)> {
        let mut city = UNKNOWN.to_string();
        let mut country = UNKNOWN.to_string();

        let Some(address) = self.addresses.lookup(address_id) else {
            return Ok((city, country));
        };
        let Some(city_row) = self.cities.lookup(address.opt_i64("city_id")?) else {
            return Ok((city, country));
        };
        if let Some(name) = city_row.opt_text("city")? {
            city = name.to_string();
        }
        if let Some(country_row) = self.countries.lookup(city_row.opt_i64("country_id")?) {
            if let Some(name) = country_row.opt_text("country")? {
                country = name.to_string();
            }
        }
        Ok((city, country))
    }
}

/// `store` + address chain into `dim_store`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreLoader;

impl Loader for StoreLoader {
    fn table(&self) -> &'static str {
        schema::DIM_STORE
    }

    fn tier(&self) -> Tier {
        Tier::Dimension
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("last_update")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let stores = read_changed(ctx.source, source::STORE, "last_update", since)?;
        let locations = Locations::load(ctx.source)?;
        let now = ctx.now;

        upsert_dimension(ctx.target, &schema::dim_store(), "store_id", &stores, |store| {
            let (city, country) = locations.place(store.opt_i64("address_id")?)?;
            Ok(Row::new()
                .with("city", city)
                .with("country", country)
                .with("last_update", last_update(store, now)?))
        })
    }
}

/// `customer` + address chain into `dim_customer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerLoader;

impl Loader for CustomerLoader {
    fn table(&self) -> &'static str {
        schema::DIM_CUSTOMER
    }

    fn tier(&self) -> Tier {
        Tier::Dimension
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("last_update")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let customers = read_changed(ctx.source, source::CUSTOMER, "last_update", since)?;
        let locations = Locations::load(ctx.source)?;
        let now = ctx.now;

        upsert_dimension(
            ctx.target,
            &schema::dim_customer(),
            "customer_id",
            &customers,
            |customer| {
                let (city, country) = locations.place(customer.opt_i64("address_id")?)?;
                Ok(Row::new()
                    .with("first_name", customer.text("first_name")?)
                    .with("last_name", customer.text("last_name")?)
                    .with("active", customer.i64("active")?)
                    .with("city", city)
                    .with("country", country)
                    .with("last_update", last_update(customer, now)?))
            },
        )
    }
}
