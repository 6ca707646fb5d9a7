//! # Starsync Testkit
//!
//! Test utilities for Starsync.
//!
//! This crate provides:
//! - Source schema definitions for a Sakila-shaped operational database
//! - A fixture builder with a small standard dataset
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use starsync_store::ReadStore;
//! use starsync_testkit::prelude::*;
//!
//! let source = SakilaFixture::standard().in_memory();
//! assert_eq!(source.find("film", None).unwrap().len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod source_schema;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::source_schema::*;
}

pub use fixtures::*;
pub use generators::*;
pub use source_schema::*;
