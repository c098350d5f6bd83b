//! Launcher port turning a process spec into a running handle.

use super::{ManagedProcess, ProcessHostResult};
use crate::process::domain::ProcessSpec;
use async_trait::async_trait;
use std::sync::Arc;

/// Starts processes from their specification.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launches `spec` and returns a started handle.
    ///
    /// # Errors
    ///
    /// Returns [`super::ProcessHostError`] when the process cannot be
    /// started.
    async fn launch(&self, spec: &ProcessSpec) -> ProcessHostResult<Arc<dyn ManagedProcess>>;
}
