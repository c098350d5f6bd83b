//! Ports connecting external stop requests to the scheduler.

use super::ProcessHostResult;
use crate::process::domain::StopRequestKind;
use async_trait::async_trait;

/// Source of external "please stop" edges.
pub trait StopSignalSource: Send + Sync {
    /// Returns whether a stop of `kind` has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`super::ProcessHostError`] when the source cannot be read.
    fn is_requested(&self, kind: StopRequestKind) -> ProcessHostResult<bool>;

    /// Discards pending requests of every kind.
    ///
    /// # Errors
    ///
    /// Returns [`super::ProcessHostError`] when the source cannot be reset.
    fn clear(&self) -> ProcessHostResult<()>;
}

/// Something that can be shut down gracefully or immediately.
#[async_trait]
pub trait ShutdownTarget: Send + Sync {
    /// Performs an ordered graceful shutdown.
    async fn stop(&self);

    /// Terminates everything without draining.
    async fn hard_stop(&self);
}
