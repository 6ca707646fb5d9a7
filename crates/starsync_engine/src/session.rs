//! Scoped ownership of the source and target store handles.

use crate::error::EngineResult;
use starsync_store::ReadStore;

/// Owns both store handles for one invocation and releases each exactly
/// once, either through [`StoreSession::close`] or on drop.
pub struct StoreSession<S: ReadStore, T: ReadStore> {
    source: S,
    target: T,
    closed: bool,
}

impl<S: ReadStore, T: ReadStore> StoreSession<S, T> {
    /// Takes ownership of both handles.
    pub fn new(source: S, target: T) -> Self {
        Self {
            source,
            target,
            closed: false,
        }
    }

    /// The source store.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The target store.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns true once both handles have been released.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases both handles. The target is closed even if closing the
    /// source fails; the first error is returned. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the first close failure.
    pub fn close(&mut self) -> EngineResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let source = self.source.close();
        let target = self.target.close();
        tracing::debug!("store session closed");
        source?;
        target?;
        Ok(())
    }
}

impl<S: ReadStore, T: ReadStore> Drop for StoreSession<S, T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close store session");
        }
    }
}
