//! Pollers forwarding external stop requests to a shutdown target.

use crate::process::{
    domain::StopRequestKind,
    ports::{ShutdownTarget, StopSignalSource},
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Polls a stop signal source for one kind of request.
///
/// A graceful watcher calls [`ShutdownTarget::stop`]; a hard watcher calls
/// [`ShutdownTarget::hard_stop`]. The shutdown runs in its own task, so
/// [`Self::stop_watching`] never cancels a shutdown already under way.
pub struct StopRequestWatcher {
    kind: StopRequestKind,
    source: Arc<dyn StopSignalSource>,
    target: Arc<dyn ShutdownTarget>,
    poll_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StopRequestWatcher {
    /// Creates a watcher for `kind` requests.
    #[must_use]
    pub const fn new(
        kind: StopRequestKind,
        source: Arc<dyn StopSignalSource>,
        target: Arc<dyn ShutdownTarget>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            kind,
            source,
            target,
            poll_interval,
            task: Mutex::new(None),
        }
    }

    /// Returns the kind of request this watcher forwards.
    #[must_use]
    pub const fn kind(&self) -> StopRequestKind {
        self.kind
    }

    /// Starts polling. Calling it again while polling is a no-op.
    pub fn start_watching(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let kind = self.kind;
        let source = Arc::clone(&self.source);
        let target = Arc::clone(&self.target);
        let poll_interval = self.poll_interval;
        debug!(%kind, "watching for stop requests");
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                match source.is_requested(kind) {
                    Ok(true) => {
                        info!(%kind, "stop requested");
                        tokio::spawn(forward(kind, target));
                        return;
                    }
                    Ok(false) => {}
                    Err(err) => warn!(%kind, error = %err, "failed to read stop request"),
                }
            }
        }));
    }

    /// Stops polling. Idempotent and safe to call from any task, including
    /// during shutdown.
    pub fn stop_watching(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = task {
            handle.abort();
            debug!(kind = %self.kind, "stopped watching for stop requests");
        }
    }

    /// Returns whether the poller is running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn forward(kind: StopRequestKind, target: Arc<dyn ShutdownTarget>) {
    match kind {
        StopRequestKind::Graceful => target.stop().await,
        StopRequestKind::Hard => target.hard_stop().await,
    }
}

impl Drop for StopRequestWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
