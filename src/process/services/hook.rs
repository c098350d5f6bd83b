//! Cooperative stop path run when the node itself is asked to terminate.

use super::StopRequestWatcher;
use crate::process::ports::ShutdownTarget;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

/// Stops every stop request watcher, then gracefully stops the target.
///
/// Watchers are disarmed first so a marker written during shutdown cannot
/// start a second shutdown path next to this one.
pub struct ExitHook {
    watchers: Vec<Arc<StopRequestWatcher>>,
    target: Arc<dyn ShutdownTarget>,
}

impl ExitHook {
    /// Creates a hook stopping `target`.
    #[must_use]
    pub fn new(target: Arc<dyn ShutdownTarget>) -> Self {
        Self {
            watchers: Vec::new(),
            target,
        }
    }

    /// Adds a watcher to disarm when the hook runs.
    #[must_use]
    pub fn with_watcher(mut self, watcher: Arc<StopRequestWatcher>) -> Self {
        self.watchers.push(watcher);
        self
    }

    /// Waits for `signal`, then runs [`Self::trigger`].
    ///
    /// Nothing is stopped when `signal` fails.
    pub async fn run<F>(&self, signal: F)
    where
        F: Future<Output = io::Result<()>> + Send,
    {
        if let Err(err) = signal.await {
            warn!(error = %err, "cannot listen for termination signals");
            return;
        }
        info!("termination signal received");
        self.trigger().await;
    }

    /// Disarms every watcher and returns once the target has stopped.
    pub async fn trigger(&self) {
        for watcher in &self.watchers {
            watcher.stop_watching();
        }
        self.target.stop().await;
    }
}
