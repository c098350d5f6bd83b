//! Single-shot readiness probe port.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// One readiness check against a process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Checks readiness once.
    ///
    /// `Ok(false)` means the process answered but is not ready yet.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] describing why the process could not be
    /// checked.
    async fn check(&self) -> Result<bool, ProbeError>;
}

/// Failure modes of a readiness probe.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The process could not be reached (for example, connection refused).
    #[error("cannot reach process: {0}")]
    Connectivity(String),

    /// The process is up but waits for its cluster quorum or leader.
    #[error("waiting for cluster quorum: {0}")]
    AwaitingQuorum(String),

    /// Any other failure.
    #[error("unexpected probe failure: {0}")]
    Unexpected(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProbeError {
    /// Wraps an unexpected failure.
    pub fn unexpected(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unexpected(Arc::new(err))
    }
}
