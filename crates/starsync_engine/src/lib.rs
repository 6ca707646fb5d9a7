//! # Starsync Engine
//!
//! Star-schema sync engine for Starsync.
//!
//! This crate provides:
//! - Star schema definitions (dimensions, bridges, facts, calendar)
//! - Idempotent upsert by natural key
//! - Calendar dimension population
//! - Surrogate key resolution
//! - Per-table watermarks for incremental loads
//! - Source/target reconciliation with tolerances
//! - A load orchestrator (idle → preparing → loading → reconciling → completed)
//!
//! ## Architecture
//!
//! A run loads in **dependency order**:
//! 1. Dimensions (film, actor, category, store, customer)
//! 2. Bridges between dimensions
//! 3. Facts, which reference dimensions and the calendar
//!
//! Each loader reads from a [`starsync_store::ReadStore`] and writes to a
//! [`starsync_store::WriteStore`]; the engine never assumes a particular
//! database.
//!
//! ## Key Invariants
//!
//! - Writes are upserts keyed by natural key, so re-running is safe
//! - A fact is written only when every dimension it references resolves
//! - Every date a fact references exists in the calendar
//! - Watermarks never move backwards and are recorded only after the
//!   loader that owns them completes
//!
//! ## Example
//!
//! ```rust
//! use starsync_engine::{EngineConfig, LoadMode, Orchestrator, RunState};
//! use starsync_store::InMemoryStore;
//! use starsync_testkit::SakilaFixture;
//!
//! let source = SakilaFixture::standard().in_memory();
//! let orchestrator = Orchestrator::new(EngineConfig::default(), source, InMemoryStore::new());
//! let report = orchestrator.run(LoadMode::Full).unwrap();
//! assert_eq!(orchestrator.state(), RunState::Completed);
//! assert_eq!(report.total_skipped(), 0);
//! assert!(report.reconciliation.unwrap().passed());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod calendar;
mod config;
mod error;
pub mod loaders;
mod orchestrator;
mod reconcile;
mod resolver;
pub mod schema;
mod session;
mod upsert;
mod watermark;

pub use calendar::{date_key, ensure_date, CalendarAttributes, CalendarCache};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use loaders::{LoadContext, LoadOutcome, Loader, Tier};
pub use orchestrator::{init_schema, LoadMode, LoaderReport, Orchestrator, RunReport, RunState, RunStats};
pub use reconcile::{
    check_threshold, default_specs, parse_specs, AggregateCheck, AggregateResult, Comparison,
    Reconciler, ReconciliationReport, ReconciliationSpec, TableReconciliation, Tolerance,
};
pub use resolver::{resolve, Dimension, KeyMap, LookupTable};
pub use session::StoreSession;
pub use upsert::{insert_if_absent, upsert, Upserted};
pub use watermark::{max_timestamp, SyncStateTracker};
