//! Node-wide shared state port.

use crate::process::domain::ProcessId;
use std::sync::Arc;
use thiserror::Error;

/// Result type for app state operations.
pub type AppStateResult<T> = Result<T, AppStateError>;

/// Small state shared by the processes of a node.
pub trait AppState: Send + Sync {
    /// Returns whether `process` has been flagged operational.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be read.
    fn is_operational(&self, process: ProcessId) -> AppStateResult<bool>;

    /// Flags `process` operational.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be written.
    fn set_operational(&self, process: ProcessId) -> AppStateResult<()>;

    /// Clears the operational flag of `process`.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be written.
    fn clear_operational(&self, process: ProcessId) -> AppStateResult<()>;

    /// Tries to become the web leader, the single web server allowed to
    /// run startup-only work. Returns `true` for the first caller only.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be written.
    fn try_to_lock_web_leader(&self) -> AppStateResult<bool>;

    /// Registers the cluster name.
    ///
    /// Registering the same name again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError::ConflictingClusterName`] when a different
    /// name is already registered.
    fn register_cluster_name(&self, name: &str) -> AppStateResult<()>;

    /// Registers the product version.
    ///
    /// Registering the same version again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError::ConflictingVersion`] when a different
    /// version is already registered.
    fn register_version(&self, version: &str) -> AppStateResult<()>;

    /// Returns the registered cluster name.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be read.
    fn cluster_name(&self) -> AppStateResult<Option<String>>;

    /// Returns the registered version.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be read.
    fn version(&self) -> AppStateResult<Option<String>>;

    /// Clears operational flags and the web leader lock.
    ///
    /// Registrations survive a reset.
    ///
    /// # Errors
    ///
    /// Returns [`AppStateError`] when the state cannot be written.
    fn reset(&self) -> AppStateResult<()>;
}

/// Errors returned by app state implementations.
#[derive(Debug, Clone, Error)]
pub enum AppStateError {
    /// Another cluster name is already registered.
    #[error("cluster name mismatch: registered {registered}, got {requested}")]
    ConflictingClusterName {
        /// Name already registered.
        registered: String,
        /// Name that was rejected.
        requested: String,
    },

    /// Another version is already registered.
    #[error("version mismatch: registered {registered}, got {requested}")]
    ConflictingVersion {
        /// Version already registered.
        registered: String,
        /// Version that was rejected.
        requested: String,
    },

    /// State storage failure.
    #[error("app state storage error: {0}")]
    Storage(Arc<dyn std::error::Error + Send + Sync>),
}

impl AppStateError {
    /// Wraps a storage error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Arc::new(err))
    }
}
