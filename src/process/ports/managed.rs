//! Capability set of a supervised process.

use crate::process::domain::{ProcessExit, ProcessId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for process host operations.
pub type ProcessHostResult<T> = Result<T, ProcessHostError>;

/// One supervised process, whatever backs it.
///
/// The scheduler only relies on this capability set. Natively spawned
/// children and externally started processes watched through a health
/// probe are both variants behind it.
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// Returns which process this handle supervises.
    fn process_id(&self) -> ProcessId;

    /// Starts the process.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessHostError::AlreadyRunning`] when called twice or
    /// [`ProcessHostError::Spawn`] when the OS refuses to start it.
    async fn start(&self) -> ProcessHostResult<()>;

    /// Returns whether the process has started and not exited.
    fn is_alive(&self) -> bool;

    /// Probes readiness, retrying within the configured bound.
    ///
    /// Returns `false` when retries are exhausted or the probe failed in an
    /// unexpected way. Once `true`, later calls return `true` without
    /// probing.
    async fn is_operational(&self) -> bool;

    /// Returns the exit outcome once the process has exited.
    fn exit_status(&self) -> Option<ProcessExit>;

    /// Returns whether the process exited asking to be relaunched.
    fn asked_for_restart(&self) -> bool {
        self.exit_status()
            .is_some_and(ProcessExit::asked_for_restart)
    }

    /// Asks the process to finish current work and exit.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessHostError::Signal`] when the request cannot be
    /// delivered.
    async fn ask_for_stop(&self) -> ProcessHostResult<()>;

    /// Terminates the process without draining.
    ///
    /// Any wait inside is bounded; an unresponsive process is killed.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessHostError::Signal`] when the process cannot be
    /// signalled or killed.
    async fn ask_for_hard_stop(&self) -> ProcessHostResult<()>;

    /// Waits until the process has exited.
    async fn wait_for(&self) -> ProcessExit;

    /// Waits until the process has exited or `timeout` elapses.
    async fn wait_for_timeout(&self, timeout: Duration) -> Option<ProcessExit> {
        tokio::time::timeout(timeout, self.wait_for()).await.ok()
    }
}

/// Errors returned by process host adapters.
#[derive(Debug, Clone, Error)]
pub enum ProcessHostError {
    /// The OS refused to spawn the process.
    #[error("failed to spawn process {process}: {reason}")]
    Spawn {
        /// Process that failed to start.
        process: ProcessId,
        /// Underlying failure.
        reason: String,
    },

    /// The process was already started.
    #[error("process {0} is already running")]
    AlreadyRunning(ProcessId),

    /// Delivering a termination signal failed.
    #[error("failed to signal process {process}: {reason}")]
    Signal {
        /// Target process.
        process: ProcessId,
        /// Underlying failure.
        reason: String,
    },

    /// Generic runtime failure.
    #[error("process host runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProcessHostError {
    /// Wraps a runtime error from the host adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
