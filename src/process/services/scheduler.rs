//! Scheduler supervising the processes of one node.

use crate::process::{
    domain::{
        NodeLifecycle, NodePlan, ProcessDomainError, ProcessExit, ProcessId,
        ProcessLifecycleState, ProcessSpec, RestartPolicy,
    },
    ports::{AppState, ManagedProcess, ProcessLauncher, ShutdownTarget},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Environment variable telling a web server whether it holds the web
/// leader lock.
pub const WEB_LEADER_ENV: &str = "OVERSEER_WEB_LEADER";

/// Tuning knobs of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Pause between two supervision rounds.
    pub tick: Duration,
    /// Time granted to processes to exit after a graceful stop request
    /// before escalating to a hard stop.
    pub graceful_stop_timeout: Duration,
    /// Restart decision applied when a process exits.
    pub restart_policy: RestartPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            graceful_stop_timeout: Duration::from_secs(30),
            restart_policy: RestartPolicy::default(),
        }
    }
}

/// Service-level errors for the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The node is not in a state allowing the operation.
    #[error(transparent)]
    Domain(#[from] ProcessDomainError),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

struct ProcessSlot {
    state: ProcessLifecycleState,
    handle: Option<Arc<dyn ManagedProcess>>,
    restarts: u32,
}

impl ProcessSlot {
    const fn new() -> Self {
        Self {
            state: ProcessLifecycleState::Init,
            handle: None,
            restarts: 0,
        }
    }

    fn advance(&mut self, process: ProcessId, target: ProcessLifecycleState) {
        if self.state == target {
            return;
        }
        match self.state.transition(process, target) {
            Ok(next) => self.state = next,
            Err(err) => debug!(error = %err, "ignoring lifecycle change"),
        }
    }
}

/// Launches, watches, restarts, and stops the processes of a node.
///
/// Dependents are launched only once their dependencies are operational.
/// The node stops as a whole when a process exits without being granted a
/// restart.
pub struct Scheduler<L, A>
where
    L: ProcessLauncher + 'static,
    A: AppState + 'static,
{
    launcher: Arc<L>,
    app_state: Arc<A>,
    plan: NodePlan,
    settings: SchedulerSettings,
    slots: tokio::sync::Mutex<BTreeMap<ProcessId, ProcessSlot>>,
    lifecycle: watch::Sender<NodeLifecycle>,
}

impl<L, A> Scheduler<L, A>
where
    L: ProcessLauncher + 'static,
    A: AppState + 'static,
{
    /// Creates a scheduler for `plan`. Nothing is launched until
    /// [`Self::schedule`] is called.
    #[must_use]
    pub fn new(
        launcher: Arc<L>,
        app_state: Arc<A>,
        plan: NodePlan,
        settings: SchedulerSettings,
    ) -> Self {
        let slots = plan.ids().into_iter().map(|id| (id, ProcessSlot::new())).collect();
        let (lifecycle, _) = watch::channel(NodeLifecycle::Init);
        Self {
            launcher,
            app_state,
            plan,
            settings,
            slots: tokio::sync::Mutex::new(slots),
            lifecycle,
        }
    }

    /// Returns the current node lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> NodeLifecycle {
        *self.lifecycle.borrow()
    }

    /// Subscribes to node lifecycle changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NodeLifecycle> {
        self.lifecycle.subscribe()
    }

    /// Returns the lifecycle state of `process`, if it is configured.
    pub async fn process_state(&self, process: ProcessId) -> Option<ProcessLifecycleState> {
        self.slots.lock().await.get(&process).map(|slot| slot.state)
    }

    /// Returns how many times `process` has been relaunched.
    pub async fn restarts(&self, process: ProcessId) -> u32 {
        self.slots
            .lock()
            .await
            .get(&process)
            .map_or(0, |slot| slot.restarts)
    }

    /// Starts supervising in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Domain`] when the node was already
    /// scheduled or stopped.
    pub fn schedule(self: &Arc<Self>) -> SchedulerResult<()> {
        let mut current = NodeLifecycle::Init;
        let started = self.lifecycle.send_if_modified(|state| {
            current = *state;
            if *state != NodeLifecycle::Init {
                return false;
            }
            *state = NodeLifecycle::Starting;
            true
        });
        if !started {
            return Err(ProcessDomainError::InvalidNodeTransition {
                from: current.as_str().to_owned(),
                to: NodeLifecycle::Starting.as_str().to_owned(),
            }
            .into());
        }
        info!(processes = ?self.plan.ids(), "scheduling node processes");

        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.supervise().await });
        Ok(())
    }

    /// Waits until every supervised process has stopped.
    pub async fn await_termination(&self) {
        let mut receiver = self.lifecycle.subscribe();
        if receiver
            .wait_for(|state| *state == NodeLifecycle::Stopped)
            .await
            .is_err()
        {
            debug!("lifecycle channel closed before termination");
        }
    }

    /// Performs an ordered graceful shutdown and returns once every process
    /// has exited.
    ///
    /// Every process is asked to stop, in reverse startup order, before any
    /// of them is waited for, so they all drain within the same graceful
    /// timeout. Those still running when it expires are hard stopped.
    /// Concurrent callers wait for the first one to finish.
    pub async fn stop(&self) {
        if !self.begin_shutdown(NodeLifecycle::Stopping) {
            self.await_termination().await;
            return;
        }
        info!("stopping node");

        let handles = self
            .claim_running(ProcessLifecycleState::Stopping)
            .await;
        for handle in &handles {
            if let Err(err) = handle.ask_for_stop().await {
                warn!(process = %handle.process_id(), error = %err, "stop request failed");
            }
        }

        let deadline = Instant::now() + self.settings.graceful_stop_timeout;
        let mut lingering = Vec::new();
        for handle in &handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if handle.wait_for_timeout(remaining).await.is_none() {
                lingering.push(Arc::clone(handle));
            }
        }

        if !lingering.is_empty() {
            warn!(
                count = lingering.len(),
                "graceful stop timed out, escalating to hard stop"
            );
            self.begin_shutdown(NodeLifecycle::HardStopping);
            hard_stop_all(&lingering).await;
        }
        self.finish_shutdown().await;
    }

    /// Terminates every process without draining and returns once they
    /// have exited. Escalates a graceful stop already in progress.
    pub async fn hard_stop(&self) {
        if !self.begin_shutdown(NodeLifecycle::HardStopping) {
            self.await_termination().await;
            return;
        }
        info!("hard stopping node");

        let handles = self
            .claim_running(ProcessLifecycleState::HardStopping)
            .await;
        hard_stop_all(&handles).await;
        self.finish_shutdown().await;
    }

    /// Returns `true` for the caller that moved the node into `target`.
    fn begin_shutdown(&self, target: NodeLifecycle) -> bool {
        self.lifecycle.send_if_modified(|state| {
            if *state == target || !state.can_transition_to(target) {
                return false;
            }
            *state = target;
            true
        })
    }

    /// Marks live processes as `target` and returns their handles in
    /// reverse startup order.
    async fn claim_running(&self, target: ProcessLifecycleState) -> Vec<Arc<dyn ManagedProcess>> {
        let mut slots = self.slots.lock().await;
        let mut handles = Vec::new();
        for (id, slot) in slots.iter_mut().rev() {
            if slot.state == ProcessLifecycleState::Init {
                slot.advance(*id, ProcessLifecycleState::Stopped);
                continue;
            }
            if let Some(handle) = slot.handle.as_ref().filter(|handle| handle.is_alive()) {
                handles.push(Arc::clone(handle));
                slot.advance(*id, target);
            }
        }
        handles
    }

    async fn finish_shutdown(&self) {
        {
            let mut slots = self.slots.lock().await;
            for (id, slot) in slots.iter_mut() {
                slot.advance(*id, ProcessLifecycleState::Stopped);
                self.clear_operational(*id);
            }
        }
        let stopped = self.lifecycle.send_if_modified(|state| {
            if *state == NodeLifecycle::Stopped {
                return false;
            }
            *state = NodeLifecycle::Stopped;
            true
        });
        if stopped {
            info!("node stopped");
        }
    }

    async fn supervise(&self) {
        let mut lifecycle = self.lifecycle.subscribe();
        loop {
            if self.lifecycle().is_shutting_down() {
                return;
            }
            if !self.supervise_once().await {
                self.stop().await;
                return;
            }
            tokio::select! {
                () = tokio::time::sleep(self.settings.tick) => {}
                _ = lifecycle.wait_for(|state| state.is_shutting_down()) => return,
            }
        }
    }

    /// Runs one supervision round. Returns `false` when the node must stop.
    async fn supervise_once(&self) -> bool {
        for (process, exit, restarts) in self.reap_exits().await {
            if self.settings.restart_policy.should_restart(exit, restarts) {
                self.prepare_restart(process).await;
                continue;
            }
            warn!(process = %process, %exit, "process exited, stopping node");
            return false;
        }

        self.promote_ready().await;
        if !self.launch_startable().await {
            return false;
        }
        self.refresh_node_lifecycle().await;
        true
    }

    async fn reap_exits(&self) -> Vec<(ProcessId, ProcessExit, u32)> {
        let mut slots = self.slots.lock().await;
        let mut exits = Vec::new();
        for (id, slot) in slots.iter_mut() {
            if !matches!(
                slot.state,
                ProcessLifecycleState::Starting | ProcessLifecycleState::Operational
            ) {
                continue;
            }
            let Some(exit) = slot.handle.as_ref().and_then(|handle| handle.exit_status()) else {
                continue;
            };
            slot.advance(*id, ProcessLifecycleState::Stopped);
            self.clear_operational(*id);
            exits.push((*id, exit, slot.restarts));
        }
        exits
    }

    async fn prepare_restart(&self, process: ProcessId) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&process) {
            slot.advance(process, ProcessLifecycleState::Init);
            slot.handle = None;
            slot.restarts = slot.restarts.saturating_add(1);
            info!(process = %process, restarts = slot.restarts, "relaunching process");
        }
    }

    async fn promote_ready(&self) {
        let starting: Vec<(ProcessId, Arc<dyn ManagedProcess>)> = {
            let slots = self.slots.lock().await;
            slots
                .iter()
                .filter(|(_, slot)| slot.state == ProcessLifecycleState::Starting)
                .filter_map(|(id, slot)| slot.handle.clone().map(|handle| (*id, handle)))
                .collect()
        };

        for (id, handle) in starting {
            if !handle.is_operational().await {
                continue;
            }
            let mut slots = self.slots.lock().await;
            if self.lifecycle().is_shutting_down() {
                return;
            }
            let Some(slot) = slots.get_mut(&id) else {
                continue;
            };
            let same_handle = slot
                .handle
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &handle));
            if slot.state != ProcessLifecycleState::Starting || !same_handle {
                continue;
            }
            slot.advance(id, ProcessLifecycleState::Operational);
            if let Err(err) = self.app_state.set_operational(id) {
                warn!(process = %id, error = %err, "failed to flag process operational");
            }
            info!(process = %id, "process is operational");
        }
    }

    /// Launches every process whose dependencies are operational. Returns
    /// `false` when a launch failed.
    async fn launch_startable(&self) -> bool {
        let mut slots = self.slots.lock().await;
        if self.lifecycle().is_shutting_down() {
            return true;
        }

        let startable: Vec<ProcessSpec> = self
            .plan
            .specs()
            .filter(|spec| {
                slots
                    .get(&spec.id())
                    .is_some_and(|slot| slot.state == ProcessLifecycleState::Init)
            })
            .filter(|spec| {
                spec.depends_on().iter().all(|dependency| {
                    slots
                        .get(dependency)
                        .is_some_and(|slot| slot.state == ProcessLifecycleState::Operational)
                })
            })
            .cloned()
            .collect();

        for spec in startable {
            let id = spec.id();
            let launch_spec = self.with_leader_env(spec);
            match self.launcher.launch(&launch_spec).await {
                Ok(handle) => {
                    if let Some(slot) = slots.get_mut(&id) {
                        slot.handle = Some(handle);
                        slot.advance(id, ProcessLifecycleState::Starting);
                    }
                    info!(process = %id, "process launched");
                }
                Err(err) => {
                    error!(process = %id, error = %err, "failed to launch process");
                    if let Some(slot) = slots.get_mut(&id) {
                        slot.advance(id, ProcessLifecycleState::Stopped);
                    }
                    return false;
                }
            }
        }
        true
    }

    fn with_leader_env(&self, spec: ProcessSpec) -> ProcessSpec {
        if spec.id() != ProcessId::WebServer {
            return spec;
        }
        let leader = match self.app_state.try_to_lock_web_leader() {
            Ok(leader) => leader,
            Err(err) => {
                warn!(error = %err, "failed to acquire web leader lock");
                false
            }
        };
        debug!(leader, "web leader lock evaluated");
        spec.with_env([(WEB_LEADER_ENV.to_owned(), leader.to_string())])
    }

    async fn refresh_node_lifecycle(&self) {
        let all_operational = self
            .slots
            .lock()
            .await
            .values()
            .all(|slot| slot.state == ProcessLifecycleState::Operational);
        let target = if all_operational {
            NodeLifecycle::Operational
        } else {
            NodeLifecycle::Starting
        };
        let changed = self.lifecycle.send_if_modified(|state| {
            if *state == target || !state.can_transition_to(target) {
                return false;
            }
            *state = target;
            true
        });
        if changed {
            info!(lifecycle = %target, "node lifecycle changed");
        }
    }

    fn clear_operational(&self, process: ProcessId) {
        if let Err(err) = self.app_state.clear_operational(process) {
            warn!(process = %process, error = %err, "failed to clear operational flag");
        }
    }
}

async fn hard_stop_all(handles: &[Arc<dyn ManagedProcess>]) {
    for handle in handles {
        if let Err(err) = handle.ask_for_hard_stop().await {
            error!(process = %handle.process_id(), error = %err, "hard stop failed");
        }
    }
}

#[async_trait]
impl<L, A> ShutdownTarget for Scheduler<L, A>
where
    L: ProcessLauncher + 'static,
    A: AppState + 'static,
{
    async fn stop(&self) {
        Self::stop(self).await;
    }

    async fn hard_stop(&self) {
        Self::hard_stop(self).await;
    }
}
