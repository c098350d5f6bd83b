//! Health-only supervision of a process started outside the node.

use crate::process::{
    domain::{ProcessExit, ProcessId},
    ports::{ManagedProcess, ProcessHostError, ProcessHostResult},
    services::ReadinessChecker,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::info;

/// Watches an externally started process through its readiness probe.
///
/// The node does not own the process, so stopping only ends supervision.
pub struct ExternalProcessMonitor {
    process: ProcessId,
    readiness: ReadinessChecker,
    started: AtomicBool,
    exit: watch::Sender<Option<ProcessExit>>,
}

impl ExternalProcessMonitor {
    /// Creates an unstarted monitor.
    #[must_use]
    pub fn new(process: ProcessId, readiness: ReadinessChecker) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            process,
            readiness,
            started: AtomicBool::new(false),
            exit,
        }
    }

    fn release(&self) {
        self.readiness.interrupt();
        let released = self.exit.send_if_modified(|exit| {
            if exit.is_some() {
                return false;
            }
            *exit = Some(ProcessExit::success());
            true
        });
        if released {
            info!(process = %self.process, "stopped monitoring external process");
        }
    }
}

#[async_trait]
impl ManagedProcess for ExternalProcessMonitor {
    fn process_id(&self) -> ProcessId {
        self.process
    }

    async fn start(&self) -> ProcessHostResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProcessHostError::AlreadyRunning(self.process));
        }
        info!(process = %self.process, "monitoring externally started process");
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.started.load(Ordering::Acquire) && self.exit.borrow().is_none()
    }

    async fn is_operational(&self) -> bool {
        self.is_alive() && self.readiness.check().await
    }

    fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    async fn ask_for_stop(&self) -> ProcessHostResult<()> {
        self.release();
        Ok(())
    }

    async fn ask_for_hard_stop(&self) -> ProcessHostResult<()> {
        self.release();
        Ok(())
    }

    async fn wait_for(&self) -> ProcessExit {
        let mut receiver = self.exit.subscribe();
        let observed = receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|exit| *exit);
        observed.unwrap_or_else(ProcessExit::success)
    }
}
