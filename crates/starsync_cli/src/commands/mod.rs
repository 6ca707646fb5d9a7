//! CLI command implementations.

pub mod init;
pub mod load;
pub mod validate;

use starsync_store::SqliteStore;
use std::error::Error;
use std::path::Path;

/// Opens an existing source database.
pub fn open_source(path: &Path) -> Result<SqliteStore, Box<dyn Error>> {
    if !path.exists() {
        return Err(format!("No source database found at {:?}", path).into());
    }
    Ok(SqliteStore::open(path)?)
}

/// Opens the target database, creating it if needed.
pub fn open_target(path: &Path) -> Result<SqliteStore, Box<dyn Error>> {
    Ok(SqliteStore::open(path)?)
}

/// Combines a command result with the result of closing its stores.
///
/// The command error wins when both fail.
pub fn settle<R, E, C>(result: Result<R, E>, closed: Result<(), C>) -> Result<R, Box<dyn Error>>
where
    E: Error + 'static,
    C: Error + 'static,
{
    match (result, closed) {
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close stores after an error");
            Err(Box::new(e))
        }
        (Err(e), Ok(())) => Err(Box::new(e)),
        (Ok(_), Err(close_err)) => Err(Box::new(close_err)),
        (Ok(value), Ok(())) => Ok(value),
    }
}
