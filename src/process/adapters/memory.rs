//! Scriptable in-memory process adapters for supervision tests.

use crate::process::{
    domain::{ProcessExit, ProcessId, ProcessSpec, StopRequestKind},
    ports::{
        ManagedProcess, ProcessHostError, ProcessHostResult, ProcessLauncher, StopSignalSource,
    },
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// A process whose lifecycle is driven by the test.
#[derive(Debug)]
pub struct InMemoryManagedProcess {
    process: ProcessId,
    spec: ProcessSpec,
    started: AtomicBool,
    operational: AtomicBool,
    ignores_stop: AtomicBool,
    stop_requests: AtomicU32,
    hard_stop_requests: AtomicU32,
    exit: watch::Sender<Option<ProcessExit>>,
}

impl InMemoryManagedProcess {
    /// Creates an unstarted process for `spec`.
    #[must_use]
    pub fn new(spec: ProcessSpec) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            process: spec.id(),
            spec,
            started: AtomicBool::new(false),
            operational: AtomicBool::new(false),
            ignores_stop: AtomicBool::new(false),
            stop_requests: AtomicU32::new(0),
            hard_stop_requests: AtomicU32::new(0),
            exit,
        }
    }

    /// Returns the spec the process was launched from.
    #[must_use]
    pub const fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Makes readiness probes succeed from now on.
    pub fn mark_operational(&self) {
        self.operational.store(true, Ordering::Release);
    }

    /// Makes graceful stop requests have no effect.
    pub fn ignore_stop_requests(&self) {
        self.ignores_stop.store(true, Ordering::Release);
    }

    /// Simulates the process exiting on its own.
    pub fn exit_with(&self, exit: ProcessExit) {
        self.exit.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit);
            true
        });
    }

    /// Simulates a crash with a non-zero exit code.
    pub fn crash(&self) {
        self.exit_with(ProcessExit::from_code(Some(1)));
    }

    /// Simulates the process exiting to ask for a relaunch.
    pub fn request_restart(&self) {
        self.exit_with(ProcessExit::restart_requested());
    }

    /// Returns how many graceful stops were requested.
    #[must_use]
    pub fn stop_requests(&self) -> u32 {
        self.stop_requests.load(Ordering::Acquire)
    }

    /// Returns how many hard stops were requested.
    #[must_use]
    pub fn hard_stop_requests(&self) -> u32 {
        self.hard_stop_requests.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ManagedProcess for InMemoryManagedProcess {
    fn process_id(&self) -> ProcessId {
        self.process
    }

    async fn start(&self) -> ProcessHostResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProcessHostError::AlreadyRunning(self.process));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.started.load(Ordering::Acquire) && self.exit.borrow().is_none()
    }

    async fn is_operational(&self) -> bool {
        self.is_alive() && self.operational.load(Ordering::Acquire)
    }

    fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    async fn ask_for_stop(&self) -> ProcessHostResult<()> {
        self.stop_requests.fetch_add(1, Ordering::AcqRel);
        if !self.ignores_stop.load(Ordering::Acquire) {
            self.exit_with(ProcessExit::success());
        }
        Ok(())
    }

    async fn ask_for_hard_stop(&self) -> ProcessHostResult<()> {
        self.hard_stop_requests.fetch_add(1, Ordering::AcqRel);
        self.exit_with(ProcessExit::from_code(None));
        Ok(())
    }

    async fn wait_for(&self) -> ProcessExit {
        let mut receiver = self.exit.subscribe();
        let observed = receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|exit| *exit);
        observed.unwrap_or_else(|| ProcessExit::from_code(None))
    }
}

/// Launcher recording every launch and handing out scriptable processes.
///
/// Processes are operational as soon as they are launched unless their
/// readiness was held with [`Self::hold_readiness`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessLauncher {
    state: Arc<RwLock<LauncherState>>,
}

#[derive(Debug, Default)]
struct LauncherState {
    launches: Vec<Arc<InMemoryManagedProcess>>,
    held_readiness: HashSet<ProcessId>,
    failing: HashSet<ProcessId>,
    unresponsive: HashSet<ProcessId>,
}

impl InMemoryProcessLauncher {
    /// Creates a launcher with no recorded launches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> ProcessHostResult<std::sync::RwLockWriteGuard<'_, LauncherState>> {
        self.state
            .write()
            .map_err(|err| ProcessHostError::runtime(std::io::Error::other(err.to_string())))
    }

    fn read(&self) -> ProcessHostResult<std::sync::RwLockReadGuard<'_, LauncherState>> {
        self.state
            .read()
            .map_err(|err| ProcessHostError::runtime(std::io::Error::other(err.to_string())))
    }

    /// Keeps future launches of `process` not operational until the test
    /// calls [`InMemoryManagedProcess::mark_operational`].
    ///
    /// # Errors
    ///
    /// Returns host runtime errors when lock acquisition fails.
    pub fn hold_readiness(&self, process: ProcessId) -> ProcessHostResult<()> {
        self.write()?.held_readiness.insert(process);
        Ok(())
    }

    /// Makes future launches of `process` fail.
    ///
    /// # Errors
    ///
    /// Returns host runtime errors when lock acquisition fails.
    pub fn fail_launches_of(&self, process: ProcessId) -> ProcessHostResult<()> {
        self.write()?.failing.insert(process);
        Ok(())
    }

    /// Makes future launches of `process` ignore graceful stop requests.
    ///
    /// # Errors
    ///
    /// Returns host runtime errors when lock acquisition fails.
    pub fn make_unresponsive(&self, process: ProcessId) -> ProcessHostResult<()> {
        self.write()?.unresponsive.insert(process);
        Ok(())
    }

    /// Returns the most recent launch of `process`.
    ///
    /// # Errors
    ///
    /// Returns host runtime errors when lock acquisition fails.
    pub fn latest(&self, process: ProcessId) -> ProcessHostResult<Option<Arc<InMemoryManagedProcess>>> {
        Ok(self
            .read()?
            .launches
            .iter()
            .rev()
            .find(|launched| launched.process_id() == process)
            .cloned())
    }

    /// Returns launched process identifiers in launch order.
    ///
    /// # Errors
    ///
    /// Returns host runtime errors when lock acquisition fails.
    pub fn launch_order(&self) -> ProcessHostResult<Vec<ProcessId>> {
        Ok(self
            .read()?
            .launches
            .iter()
            .map(|launched| launched.process_id())
            .collect())
    }

    /// Returns how many times each process was launched.
    ///
    /// # Errors
    ///
    /// Returns host runtime errors when lock acquisition fails.
    pub fn launch_counts(&self) -> ProcessHostResult<HashMap<ProcessId, usize>> {
        let mut counts = HashMap::new();
        for launched in &self.read()?.launches {
            *counts.entry(launched.process_id()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl ProcessLauncher for InMemoryProcessLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> ProcessHostResult<Arc<dyn ManagedProcess>> {
        let process = Arc::new(InMemoryManagedProcess::new(spec.clone()));
        {
            let mut state = self.write()?;
            if state.failing.contains(&spec.id()) {
                return Err(ProcessHostError::Spawn {
                    process: spec.id(),
                    reason: "launch failure injected by test".to_owned(),
                });
            }
            if !state.held_readiness.contains(&spec.id()) {
                process.mark_operational();
            }
            if state.unresponsive.contains(&spec.id()) {
                process.ignore_stop_requests();
            }
            state.launches.push(Arc::clone(&process));
        }
        process.start().await?;
        Ok(process)
    }
}

/// Stop signal source flipped directly by tests.
#[derive(Debug, Default)]
pub struct InMemoryStopSignals {
    graceful: AtomicBool,
    hard: AtomicBool,
}

impl InMemoryStopSignals {
    /// Creates a source with no pending request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a request of `kind`.
    pub fn request(&self, kind: StopRequestKind) {
        self.flag(kind).store(true, Ordering::Release);
    }

    const fn flag(&self, kind: StopRequestKind) -> &AtomicBool {
        match kind {
            StopRequestKind::Graceful => &self.graceful,
            StopRequestKind::Hard => &self.hard,
        }
    }
}

impl StopSignalSource for InMemoryStopSignals {
    fn is_requested(&self, kind: StopRequestKind) -> ProcessHostResult<bool> {
        Ok(self.flag(kind).load(Ordering::Acquire))
    }

    fn clear(&self) -> ProcessHostResult<()> {
        self.graceful.store(false, Ordering::Release);
        self.hard.store(false, Ordering::Release);
        Ok(())
    }
}
