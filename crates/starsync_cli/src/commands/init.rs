//! Init command implementation.

use super::{open_target, settle};
use starsync_store::ReadStore;
use std::path::Path;

/// Runs the init command.
pub fn run(target: &Path, create_indexes: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(target = %target.display(), "initializing analytics database");
    let store = open_target(target)?;
    let result = starsync_engine::init_schema(&store, create_indexes);
    settle(result, store.close())?;
    println!("Analytics database initialized at {}", target.display());
    Ok(())
}
