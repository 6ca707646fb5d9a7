//! Fact loaders.
//!
//! Every dimension key of a fact is resolved before anything is written; a
//! fact with any unresolved key is skipped whole. Calendar rows for every
//! referenced date are ensured before the fact that points at them.

use super::{read_changed, LoadContext, LoadOutcome, Loader, Tier};
use crate::error::EngineResult;
use crate::resolver::{Dimension, KeyMap, LookupTable};
use crate::schema::{self, source};
use crate::upsert::upsert;
use crate::watermark::max_timestamp;
use starsync_store::Row;
use time::PrimitiveDateTime;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days from `from` to `to`, rounded down.
pub(crate) fn whole_days(from: PrimitiveDateTime, to: PrimitiveDateTime) -> i64 {
    (to - from).whole_seconds().div_euclid(SECONDS_PER_DAY)
}

/// `rental` (via `inventory`) into `fact_rental`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RentalLoader;

impl Loader for RentalLoader {
    fn table(&self) -> &'static str {
        schema::FACT_RENTAL
    }

    fn tier(&self) -> Tier {
        Tier::Fact
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("rental_date")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let rentals = read_changed(ctx.source, source::RENTAL, "rental_date", since)?;
        let inventory = LookupTable::load(ctx.source, source::INVENTORY, "inventory_id")?;
        let films = KeyMap::load(ctx.target, Dimension::Film)?;
        let stores = KeyMap::load(ctx.target, Dimension::Store)?;
        let customers = KeyMap::load(ctx.target, Dimension::Customer)?;
        let def = schema::fact_rental();

        let mut outcome = LoadOutcome {
            read: rentals.len() as u64,
            max_timestamp: max_timestamp(&rentals, "rental_date"),
            ..LoadOutcome::default()
        };

        for rental in &rentals {
            let rental_id = rental.i64("rental_id")?;
            let Some(item) = inventory.lookup(rental.opt_i64("inventory_id")?) else {
                tracing::debug!(rental_id, "skipping rental: inventory item not found");
                outcome.skipped += 1;
                continue;
            };
            let film_key = films.lookup(item.opt_i64("film_id")?);
            let store_key = stores.lookup(item.opt_i64("store_id")?);
            let customer_key = customers.lookup(rental.opt_i64("customer_id")?);
            let (Some(film_key), Some(store_key), Some(customer_key)) = (film_key, store_key, customer_key)
            else {
                tracing::debug!(rental_id, ?film_key, ?store_key, ?customer_key, "skipping rental: dimension not loaded");
                outcome.skipped += 1;
                continue;
            };

            let rented = rental.timestamp("rental_date")?;
            let date_key_rented = ctx.calendar.ensure(ctx.target, rented)?;
            let (date_key_returned, duration) = match rental.opt_timestamp("return_date")? {
                Some(returned) => (
                    Some(ctx.calendar.ensure(ctx.target, returned)?),
                    Some(whole_days(rented, returned)),
                ),
                None => (None, None),
            };

            upsert(
                ctx.target,
                &def,
                Row::new().with("rental_id", rental_id),
                Row::new()
                    .with("date_key_rented", date_key_rented)
                    .with("date_key_returned", date_key_returned)
                    .with("film_key", film_key)
                    .with("store_key", store_key)
                    .with("customer_key", customer_key)
                    .with("staff_id", rental.i64("staff_id")?)
                    .with("rental_duration_days", duration),
            )?;
            outcome.written += 1;
        }

        Ok(outcome)
    }
}

/// `payment` (store via `staff`) into `fact_payment`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentLoader;

impl Loader for PaymentLoader {
    fn table(&self) -> &'static str {
        schema::FACT_PAYMENT
    }

    fn tier(&self) -> Tier {
        Tier::Fact
    }

    fn watermark_field(&self) -> Option<&'static str> {
        Some("payment_date")
    }

    fn load(&self, ctx: &mut LoadContext<'_>, since: Option<PrimitiveDateTime>) -> EngineResult<LoadOutcome> {
        let payments = read_changed(ctx.source, source::PAYMENT, "payment_date", since)?;
        let staff = LookupTable::load(ctx.source, source::STAFF, "staff_id")?;
        let stores = KeyMap::load(ctx.target, Dimension::Store)?;
        let customers = KeyMap::load(ctx.target, Dimension::Customer)?;
        let def = schema::fact_payment();

        let mut outcome = LoadOutcome {
            read: payments.len() as u64,
            max_timestamp: max_timestamp(&payments, "payment_date"),
            ..LoadOutcome::default()
        };

        for payment in &payments {
            let payment_id = payment.i64("payment_id")?;
            let staff_id = payment.i64("staff_id")?;
            let Some(member) = staff.get(staff_id) else {
                tracing::debug!(payment_id, staff_id, "skipping payment: staff member not found");
                outcome.skipped += 1;
                continue;
            };
            let store_key = stores.lookup(member.opt_i64("store_id")?);
            let customer_key = customers.lookup(payment.opt_i64("customer_id")?);
            let (Some(store_key), Some(customer_key)) = (store_key, customer_key) else {
                tracing::debug!(payment_id, ?store_key, ?customer_key, "skipping payment: dimension not loaded");
                outcome.skipped += 1;
                continue;
            };

            let date_key_paid = ctx
                .calendar
                .ensure(ctx.target, payment.timestamp("payment_date")?)?;

            upsert(
                ctx.target,
                &def,
                Row::new().with("payment_id", payment_id),
                Row::new()
                    .with("date_key_paid", date_key_paid)
                    .with("customer_key", customer_key)
                    .with("store_key", store_key)
                    .with("staff_id", staff_id)
                    .with("amount", payment.f64("amount")?),
            )?;
            outcome.written += 1;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starsync_store::{InMemoryStore, Predicate, ReadStore, WriteStore};
    use time::macros::datetime;

    const NOW: PrimitiveDateTime = datetime!(2024-01-01 00:00);

    /// Target with films 1, stores 1 and customers 1 loaded.
    fn target() -> InMemoryStore {
        let target = InMemoryStore::new();
        for def in schema::target_tables() {
            target.ensure_table(&def).unwrap();
        }
        target
            .insert("dim_film", Row::new().with("film_id", 1).with("title", "A"))
            .unwrap();
        target.insert("dim_store", Row::new().with("store_id", 1)).unwrap();
        target
            .insert(
                "dim_customer",
                Row::new()
                    .with("customer_id", 1)
                    .with("first_name", "MARY")
                    .with("last_name", "SMITH")
                    .with("active", 1)
                    .with("city", "X")
                    .with("country", "Y")
                    .with("last_update", NOW),
            )
            .unwrap();
        target
    }

    fn source() -> InMemoryStore {
        let source = InMemoryStore::new();
        source.seed(
            "inventory",
            vec![
                Row::new().with("inventory_id", 1).with("film_id", 1).with("store_id", 1),
                Row::new().with("inventory_id", 2).with("film_id", 2).with("store_id", 1),
            ],
        );
        source.seed(
            "staff",
            vec![
                Row::new().with("staff_id", 1).with("store_id", 1),
                Row::new().with("staff_id", 2).with("store_id", 2),
            ],
        );
        source
    }

    fn rental(id: i64, inventory_id: i64, rented: PrimitiveDateTime, returned: Option<PrimitiveDateTime>) -> Row {
        Row::new()
            .with("rental_id", id)
            .with("inventory_id", inventory_id)
            .with("customer_id", 1)
            .with("staff_id", 1)
            .with("rental_date", rented)
            .with("return_date", returned)
    }

    #[test]
    fn whole_days_rounds_down() {
        assert_eq!(whole_days(datetime!(2005-05-24 22:53:30), datetime!(2005-05-26 22:04:30)), 1);
        assert_eq!(whole_days(datetime!(2005-05-24 22:53:30), datetime!(2005-05-26 22:53:30)), 2);
        assert_eq!(whole_days(datetime!(2005-05-24 12:00), datetime!(2005-05-24 11:00)), -1);
    }

    #[test]
    fn rental_resolves_through_inventory() {
        let source = source();
        source.seed(
            "rental",
            vec![
                rental(1, 1, datetime!(2005-05-24 22:53:30), Some(datetime!(2005-05-26 22:04:30))),
                rental(2, 1, datetime!(2005-05-25 10:00:00), None),
                // film 2 not in dim_film
                rental(3, 2, datetime!(2005-05-25 11:00:00), None),
                // inventory 9 missing
                rental(4, 9, datetime!(2005-05-25 12:00:00), None),
            ],
        );
        let target = target();
        let mut ctx = LoadContext::new(&source, &target, NOW);
        let outcome = RentalLoader.load(&mut ctx, None).unwrap();

        assert_eq!(outcome.read, 4);
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.max_timestamp, Some(datetime!(2005-05-25 12:00:00)));

        let first = target
            .find_one("fact_rental", &Predicate::eq("rental_id", 1))
            .unwrap()
            .unwrap();
        assert_eq!(first.i64("date_key_rented").unwrap(), 20_050_524);
        assert_eq!(first.i64("date_key_returned").unwrap(), 20_050_526);
        assert_eq!(first.i64("rental_duration_days").unwrap(), 1);

        let outstanding = target
            .find_one("fact_rental", &Predicate::eq("rental_id", 2))
            .unwrap()
            .unwrap();
        assert_eq!(outstanding.opt_i64("date_key_returned").unwrap(), None);
        assert_eq!(outstanding.opt_i64("rental_duration_days").unwrap(), None);

        // every referenced date exists, and only those
        let dates: Vec<i64> = target
            .find("dim_date", None)
            .unwrap()
            .iter()
            .map(|r| r.i64("date_key").unwrap())
            .collect();
        assert_eq!(dates, vec![20_050_524, 20_050_526, 20_050_525]);
    }

    #[test]
    fn payment_resolves_store_through_staff() {
        let source = source();
        source.seed(
            "payment",
            vec![
                Row::new()
                    .with("payment_id", 1)
                    .with("customer_id", 1)
                    .with("staff_id", 1)
                    .with("amount", 2.99)
                    .with("payment_date", datetime!(2005-05-25 11:30:37)),
                // staff 2 works at store 2, not loaded
                Row::new()
                    .with("payment_id", 2)
                    .with("customer_id", 1)
                    .with("staff_id", 2)
                    .with("amount", 0.99)
                    .with("payment_date", datetime!(2005-05-28 10:35:23)),
                // unknown staff
                Row::new()
                    .with("payment_id", 3)
                    .with("customer_id", 1)
                    .with("staff_id", 7)
                    .with("amount", 5.99)
                    .with("payment_date", datetime!(2005-06-15 00:54:12)),
            ],
        );
        let target = target();
        let mut ctx = LoadContext::new(&source, &target, NOW);
        let outcome = PaymentLoader.load(&mut ctx, None).unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.skipped, 2);
        let payment = &target.rows("fact_payment")[0];
        assert_eq!(payment.i64("date_key_paid").unwrap(), 20_050_525);
        assert!((payment.f64("amount").unwrap() - 2.99).abs() < f64::EPSILON);
        assert_eq!(target.rows("dim_date").len(), 1);
    }
}
