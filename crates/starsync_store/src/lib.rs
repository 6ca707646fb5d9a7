//! # Starsync Store
//!
//! Tabular store abstraction for Starsync.
//!
//! This crate provides the row-level access the sync engine needs from an
//! operational source database and an analytical target database.
//!
//! ## Design Principles
//!
//! - Stores speak rows ([`Row`]) of dynamic values ([`Value`])
//! - Filters and aggregates are typed ([`Predicate`], [`AggregateQuery`]),
//!   never raw SQL strings
//! - Target tables are declared ([`TableDef`]) with a natural key and an
//!   optional store-generated surrogate key
//! - Must be `Send + Sync`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing, with write counting and failure injection
//! - [`SqliteStore`] - For persistent storage using SQLite
//!
//! ## Example
//!
//! ```rust
//! use starsync_store::{ColumnType, InMemoryStore, Predicate, Row, TableDef, WriteStore};
//!
//! let store = InMemoryStore::new();
//! let def = TableDef::new("dim_actor")
//!     .surrogate("actor_key")
//!     .natural_key(&["actor_id"])
//!     .column("actor_id", ColumnType::Integer)
//!     .column("first_name", ColumnType::Text);
//! store.ensure_table(&def).unwrap();
//!
//! let row = store
//!     .insert("dim_actor", Row::new().with("actor_id", 1).with("first_name", "PENELOPE"))
//!     .unwrap();
//! assert_eq!(row.i64("actor_key").unwrap(), 1);
//! assert!(store.find_one("dim_actor", &Predicate::eq("actor_id", 1)).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod query;
mod row;
mod schema;
mod sqlite;
mod value;

pub use backend::{ReadStore, WriteStore};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use query::{is_identifier, Aggregate, AggregateQuery, Predicate};
pub use row::Row;
pub use schema::{ColumnDef, ColumnType, IndexDef, TableDef};
pub use sqlite::SqliteStore;
pub use value::{format_date, format_timestamp, parse_timestamp, Value};
