//! Integration tests for full and incremental load runs.

use starsync_engine::{
    schema, EngineConfig, EngineError, LoadMode, Orchestrator, ReconciliationSpec, RunState,
    SyncStateTracker,
};
use starsync_store::{
    AggregateQuery, InMemoryStore, Predicate, ReadStore, Row, SqliteStore, WriteStore,
};
use starsync_testkit::{ts, SakilaFixture, TempSource, LAST_UPDATE};
use std::sync::Arc;

fn orchestrator(
    config: EngineConfig,
    fixture: &SakilaFixture,
) -> (
    Orchestrator<Arc<InMemoryStore>, Arc<InMemoryStore>>,
    Arc<InMemoryStore>,
    Arc<InMemoryStore>,
) {
    let source = Arc::new(fixture.in_memory());
    let target = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(config, Arc::clone(&source), Arc::clone(&target));
    (orchestrator, source, target)
}

fn count(store: &dyn ReadStore, table: &str) -> f64 {
    store.aggregate(&AggregateQuery::count(table)).unwrap()
}

/// Films 1-7, actors 1-2, one store, one customer. Ten film/actor links,
/// three of them to actor 9 which does not exist. Five rentals, two of
/// them of copies of film 8 which does not exist either.
fn partial_fixture() -> SakilaFixture {
    let mut fixture = SakilaFixture::new()
        .language(1, "English")
        .country(1, "Canada")
        .city(1, "Lethbridge", 1)
        .address(1, Some(1))
        .store(1, Some(1))
        .staff(1, 1)
        .actor(1, "PENELOPE", "GUINESS")
        .actor(2, "NICK", "WAHLBERG")
        .customer(1, "MARY", "SMITH", Some(1));
    for film in 1..=7 {
        fixture = fixture.film(film, &format!("FILM {film}")).film_actor(film, 1);
    }
    for film in 1..=3 {
        fixture = fixture.film_actor(film, 9);
    }
    for item in 1..=5 {
        let film = if item <= 3 { item } else { 8 };
        fixture = fixture.inventory(item, film, 1).rental(
            item,
            item,
            1,
            1,
            &format!("2005-05-2{item} 10:00:00"),
            None,
        );
    }
    fixture
}

#[test]
fn full_load_builds_star_schema() {
    let (orchestrator, _source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());

    let report = orchestrator.run(LoadMode::Full).unwrap();
    assert_eq!(orchestrator.state(), RunState::Completed);
    assert_eq!(report.total_skipped(), 0);
    assert!(report.reconciliation.as_ref().unwrap().passed());

    assert_eq!(count(&*target, "dim_film"), 3.0);
    assert_eq!(count(&*target, "dim_actor"), 3.0);
    assert_eq!(count(&*target, "dim_category"), 2.0);
    assert_eq!(count(&*target, "dim_store"), 2.0);
    assert_eq!(count(&*target, "dim_customer"), 3.0);
    assert_eq!(count(&*target, "bridge_film_actor"), 4.0);
    assert_eq!(count(&*target, "bridge_film_category"), 3.0);
    assert_eq!(count(&*target, "fact_rental"), 4.0);
    assert_eq!(count(&*target, "fact_payment"), 4.0);

    let film = target
        .find_one("dim_film", &Predicate::eq("film_id", 1))
        .unwrap()
        .unwrap();
    assert_eq!(film.text("language").unwrap(), "English");

    let store = target
        .find_one("dim_store", &Predicate::eq("store_id", 2))
        .unwrap()
        .unwrap();
    assert_eq!(store.text("city").unwrap(), "Woodridge");
    assert_eq!(store.text("country").unwrap(), "Australia");
}

#[test]
fn missing_location_link_is_unknown() {
    let (orchestrator, _source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());
    orchestrator.run(LoadMode::Full).unwrap();

    let customer = target
        .find_one("dim_customer", &Predicate::eq("customer_id", 3))
        .unwrap()
        .unwrap();
    assert_eq!(customer.text("city").unwrap(), schema::UNKNOWN);
    assert_eq!(customer.text("country").unwrap(), schema::UNKNOWN);
}

#[test]
fn full_load_twice_is_idempotent() {
    let (orchestrator, _source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());

    orchestrator.run(LoadMode::Full).unwrap();
    let first = target.snapshot();

    let second_run = orchestrator.run(LoadMode::Full).unwrap();
    assert_eq!(target.snapshot(), first);

    let bridge = second_run.loader("bridge_film_actor").unwrap();
    assert_eq!((bridge.written, bridge.unchanged), (0, 4));
    assert_eq!(orchestrator.stats().runs_completed, 2);
}

#[test]
fn calendar_holds_each_referenced_date_once() {
    let (orchestrator, _source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());
    orchestrator.run(LoadMode::Full).unwrap();
    orchestrator.run(LoadMode::Full).unwrap();

    let keys: Vec<i64> = target
        .rows("dim_date")
        .iter()
        .map(|r| r.i64("date_key").unwrap())
        .collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(
        sorted,
        vec![20_050_524, 20_050_525, 20_050_526, 20_050_528, 20_050_601, 20_050_615]
    );

    let day = target
        .find_one("dim_date", &Predicate::eq("date_key", 20_050_524))
        .unwrap()
        .unwrap();
    assert_eq!(day.i64("year").unwrap(), 2005);
    assert_eq!(day.i64("quarter").unwrap(), 2);
    assert_eq!(day.i64("month").unwrap(), 5);
    assert_eq!(day.i64("day_of_month").unwrap(), 24);
    // Tuesday
    assert_eq!(day.i64("day_of_week").unwrap(), 2);
    assert_eq!(day.i64("is_weekend").unwrap(), 0);
}

#[test]
fn unresolved_references_are_skipped() {
    let fixture = partial_fixture();
    let specs = vec![ReconciliationSpec::new("fact_rental").counting_source("rental")];
    let (orchestrator, _source, target) =
        orchestrator(EngineConfig::default().with_specs(specs), &fixture);

    let report = orchestrator.run(LoadMode::Full).unwrap();

    let bridge = report.loader("bridge_film_actor").unwrap();
    assert_eq!((bridge.read, bridge.written, bridge.skipped), (10, 7, 3));
    let rentals = report.loader("fact_rental").unwrap();
    assert_eq!((rentals.read, rentals.written, rentals.skipped), (5, 3, 2));

    assert_eq!(count(&*target, "bridge_film_actor"), 7.0);
    assert_eq!(count(&*target, "fact_rental"), 3.0);
    for rental in target.rows("fact_rental") {
        assert!(rental.i64("rental_id").unwrap() <= 3);
    }

    let reconciliation = report.reconciliation.as_ref().unwrap();
    let rental_count = reconciliation.table("fact_rental").unwrap().count.unwrap();
    assert_eq!(rental_count.target, rental_count.source - rentals.skipped as f64);
    assert!(!reconciliation.passed());
    assert_eq!(reconciliation.failures(), vec!["fact_rental"]);
}

#[test]
fn mismatch_aborts_when_configured() {
    let specs = vec![ReconciliationSpec::new("fact_rental").counting_source("rental")];
    let config = EngineConfig::default()
        .with_specs(specs)
        .with_fail_on_mismatch(true);
    let (orchestrator, _source, target) = orchestrator(config, &partial_fixture());

    match orchestrator.run(LoadMode::Full) {
        Err(EngineError::ReconciliationFailed { tables }) => {
            assert_eq!(tables, vec!["fact_rental".to_string()]);
        }
        other => panic!("expected reconciliation failure, got {other:?}"),
    }
    assert_eq!(orchestrator.state(), RunState::Error);
    // loaded data stays in place
    assert_eq!(count(&*target, "fact_rental"), 3.0);
}

#[test]
fn incremental_without_watermark_matches_full() {
    let fixture = SakilaFixture::standard();
    let (full, _, full_target) = orchestrator(EngineConfig::default(), &fixture);
    let (incremental, _, incremental_target) = orchestrator(EngineConfig::default(), &fixture);

    full.run(LoadMode::Full).unwrap();
    let report = incremental.run(LoadMode::Incremental).unwrap();

    assert_eq!(full_target.snapshot(), incremental_target.snapshot());
    assert!(report.loaders.iter().all(|l| l.watermark_before.is_none()));
}

#[test]
fn incremental_reads_only_newer_rows() {
    let (orchestrator, source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());
    orchestrator.run(LoadMode::Full).unwrap();

    let tracker = SyncStateTracker::new(&*target);
    assert_eq!(tracker.get_watermark("dim_film").unwrap(), Some(ts(LAST_UPDATE)));
    assert_eq!(
        tracker.get_watermark("fact_rental").unwrap(),
        Some(ts("2005-05-25 00:00:40"))
    );

    source
        .insert(
            "film",
            Row::new()
                .with("film_id", 4)
                .with("title", "AFFAIR PREJUDICE")
                .with("language_id", 1)
                .with("last_update", ts("2006-03-01 12:00:00")),
        )
        .unwrap();

    let report = orchestrator.run(LoadMode::Incremental).unwrap();
    let films = report.loader("dim_film").unwrap();
    assert_eq!((films.read, films.written), (1, 1));
    assert_eq!(films.watermark_after, Some(ts("2006-03-01 12:00:00")));
    assert_eq!(report.loader("dim_actor").unwrap().read, 0);
    assert_eq!(report.loader("fact_rental").unwrap().read, 0);
    // bridges always reload
    assert_eq!(report.loader("bridge_film_actor").unwrap().read, 4);
    assert_eq!(count(&*target, "dim_film"), 4.0);
}

#[test]
fn watermark_never_regresses() {
    let (orchestrator, source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());
    orchestrator.run(LoadMode::Full).unwrap();

    // a late row stamped before the watermark is not seen incrementally
    source
        .insert(
            "actor",
            Row::new()
                .with("actor_id", 4)
                .with("first_name", "JENNIFER")
                .with("last_name", "DAVIS")
                .with("last_update", ts("2005-01-01 00:00:00")),
        )
        .unwrap();
    let report = orchestrator.run(LoadMode::Incremental).unwrap();
    let actors = report.loader("dim_actor").unwrap();
    assert_eq!(actors.read, 0);
    assert_eq!(actors.watermark_after, Some(ts(LAST_UPDATE)));

    // a full run picks it up but keeps the watermark where it was
    let report = orchestrator.run(LoadMode::Full).unwrap();
    let actors = report.loader("dim_actor").unwrap();
    assert_eq!(actors.read, 4);
    let tracker = SyncStateTracker::new(&*target);
    assert_eq!(tracker.get_watermark("dim_actor").unwrap(), Some(ts(LAST_UPDATE)));
}

#[test]
fn loader_failure_keeps_prior_progress() {
    let (orchestrator, source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::standard());
    target.fail_writes_to("fact_rental");

    let err = orchestrator.run(LoadMode::Full).unwrap_err();
    assert_eq!(err.failed_table(), Some("fact_rental"));
    assert_eq!(orchestrator.state(), RunState::Error);
    assert!(orchestrator.stats().last_error.is_some());

    assert_eq!(count(&*target, "dim_film"), 3.0);
    assert_eq!(count(&*target, "bridge_film_category"), 3.0);
    assert_eq!(count(&*target, "fact_payment"), 0.0);

    let tracker = SyncStateTracker::new(&*target);
    assert!(tracker.get_watermark("dim_customer").unwrap().is_some());
    assert!(tracker.get_watermark("fact_rental").unwrap().is_none());
    assert!(tracker.get_watermark("fact_payment").unwrap().is_none());

    drop(orchestrator);
    assert_eq!(source.close_calls(), 1);
    assert_eq!(target.close_calls(), 1);
}

#[test]
fn empty_source_reconciles() {
    let (orchestrator, _source, target) = orchestrator(EngineConfig::default(), &SakilaFixture::new());

    let report = orchestrator.run(LoadMode::Full).unwrap();
    assert_eq!(report.total_written(), 0);
    let reconciliation = report.reconciliation.unwrap();
    assert!(reconciliation.passed());
    assert_eq!(reconciliation.tables.len(), 4);
    assert!(target.rows("dim_date").is_empty());
}

#[test]
fn sqlite_end_to_end() {
    let source = TempSource::new(&SakilaFixture::standard());
    let warehouse = source.sibling("warehouse.db");

    let first = Orchestrator::new(
        EngineConfig::default(),
        SqliteStore::open(&source.path).unwrap(),
        SqliteStore::open(&warehouse).unwrap(),
    );
    let report = first.run(LoadMode::Full).unwrap();
    assert!(report.reconciliation.unwrap().passed());
    first.close().unwrap();

    let second = Orchestrator::new(
        EngineConfig::default(),
        SqliteStore::open(&source.path).unwrap(),
        SqliteStore::open(&warehouse).unwrap(),
    );
    let report = second.run(LoadMode::Incremental).unwrap();
    assert_eq!(report.loader("fact_payment").unwrap().read, 0);
    assert_eq!(
        report.loader("fact_payment").unwrap().watermark_before,
        Some(ts("2005-06-15 18:02:53"))
    );
    assert_eq!(count(second.target(), "fact_payment"), 4.0);
    let total = second
        .target()
        .aggregate(&AggregateQuery::sum("fact_payment", "amount"))
        .unwrap();
    assert!((total - 10.96).abs() < 1e-9);
    second.close().unwrap();
}
