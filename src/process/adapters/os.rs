//! Native OS process adapter built on `tokio::process`.

use super::{monitor::ExternalProcessMonitor, probe::probe_for};
use crate::process::{
    domain::{LaunchMode, ProcessCommand, ProcessExit, ProcessId, ProcessSpec, ReadinessPolicy},
    ports::{ManagedProcess, ProcessHostError, ProcessHostResult, ProcessLauncher},
    services::ReadinessChecker,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches natively spawned children and health-only monitors.
#[derive(Debug, Clone, Copy)]
pub struct OsProcessLauncher {
    readiness: ReadinessPolicy,
    hard_stop_timeout: Duration,
}

impl OsProcessLauncher {
    /// Creates a launcher.
    ///
    /// `hard_stop_timeout` bounds how long a hard stop waits for a child
    /// before killing it.
    #[must_use]
    pub const fn new(readiness: ReadinessPolicy, hard_stop_timeout: Duration) -> Self {
        Self {
            readiness,
            hard_stop_timeout,
        }
    }

    fn readiness_for(&self, spec: &ProcessSpec) -> ReadinessChecker {
        match spec.health() {
            Some(check) => ReadinessChecker::new(spec.id(), probe_for(check), self.readiness),
            None => ReadinessChecker::without_probe(spec.id()),
        }
    }
}

#[async_trait]
impl ProcessLauncher for OsProcessLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> ProcessHostResult<Arc<dyn ManagedProcess>> {
        let readiness = self.readiness_for(spec);
        let process: Arc<dyn ManagedProcess> = match spec.launch() {
            LaunchMode::Spawn(command) => Arc::new(OsManagedProcess::new(
                spec.id(),
                command.clone(),
                readiness,
                self.hard_stop_timeout,
            )),
            LaunchMode::External => Arc::new(ExternalProcessMonitor::new(spec.id(), readiness)),
        };
        process.start().await?;
        Ok(process)
    }
}

/// A child process spawned and owned by the node.
pub struct OsManagedProcess {
    process: ProcessId,
    command: ProcessCommand,
    readiness: ReadinessChecker,
    hard_stop_timeout: Duration,
    child: Mutex<Option<Child>>,
    exit: Mutex<Option<ProcessExit>>,
}

impl OsManagedProcess {
    /// Creates an unstarted process handle.
    #[must_use]
    pub const fn new(
        process: ProcessId,
        command: ProcessCommand,
        readiness: ReadinessChecker,
        hard_stop_timeout: Duration,
    ) -> Self {
        Self {
            process,
            command,
            readiness,
            hard_stop_timeout,
            child: Mutex::new(None),
            exit: Mutex::new(None),
        }
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_exit(&self) -> MutexGuard<'_, Option<ProcessExit>> {
        self.exit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(self.command.program());
        command
            .args(self.command.args())
            .envs(self.command.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.command.working_dir() {
            command.current_dir(dir);
        }
        command
    }

    /// Reaps the child if it has exited and returns its outcome.
    fn poll_exit(&self) -> Option<ProcessExit> {
        let mut exit = self.lock_exit();
        if exit.is_some() {
            return *exit;
        }

        let mut child_slot = self.lock_child();
        let child = child_slot.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                let outcome = ProcessExit::from_code(status.code());
                info!(process = %self.process, %outcome, "process exited");
                *exit = Some(outcome);
                *child_slot = None;
                *exit
            }
            Ok(None) => None,
            Err(err) => {
                warn!(process = %self.process, error = %err, "failed to poll process status");
                None
            }
        }
    }

    fn pid(&self) -> Option<u32> {
        self.lock_child().as_ref().and_then(Child::id)
    }

    #[cfg(unix)]
    fn send_signal(&self, signal: nix::sys::signal::Signal) -> ProcessHostResult<()> {
        use nix::errno::Errno;
        use nix::unistd::Pid;

        let Some(pid) = self.pid() else {
            return Ok(());
        };
        let raw_pid = i32::try_from(pid).map_err(|err| ProcessHostError::Signal {
            process: self.process,
            reason: err.to_string(),
        })?;
        match nix::sys::signal::kill(Pid::from_raw(raw_pid), signal) {
            Ok(()) | Err(Errno::ESRCH) => {
                debug!(process = %self.process, pid, signal = signal.as_str(), "signal sent");
                Ok(())
            }
            Err(err) => Err(ProcessHostError::Signal {
                process: self.process,
                reason: err.to_string(),
            }),
        }
    }

    fn force_kill(&self) -> ProcessHostResult<()> {
        let mut child_slot = self.lock_child();
        let Some(child) = child_slot.as_mut() else {
            return Ok(());
        };
        child.start_kill().map_err(|err| ProcessHostError::Signal {
            process: self.process,
            reason: err.to_string(),
        })
    }
}

fn forward_lines<R>(process: ProcessId, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(process = %process, stream, "{line}");
        }
    });
}

#[async_trait]
impl ManagedProcess for OsManagedProcess {
    fn process_id(&self) -> ProcessId {
        self.process
    }

    async fn start(&self) -> ProcessHostResult<()> {
        if self.lock_exit().is_some() {
            return Err(ProcessHostError::AlreadyRunning(self.process));
        }
        let mut child_slot = self.lock_child();
        if child_slot.is_some() {
            return Err(ProcessHostError::AlreadyRunning(self.process));
        }

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|err| ProcessHostError::Spawn {
                process: self.process,
                reason: err.to_string(),
            })?;
        if let Some(stdout) = child.stdout.take() {
            forward_lines(self.process, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(self.process, "stderr", stderr);
        }
        info!(
            process = %self.process,
            program = self.command.program(),
            pid = child.id(),
            "process spawned"
        );
        *child_slot = Some(child);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.poll_exit().is_none() && self.lock_child().is_some()
    }

    async fn is_operational(&self) -> bool {
        self.is_alive() && self.readiness.check().await
    }

    fn exit_status(&self) -> Option<ProcessExit> {
        self.poll_exit()
    }

    async fn ask_for_stop(&self) -> ProcessHostResult<()> {
        self.readiness.interrupt();
        if !self.is_alive() {
            return Ok(());
        }
        info!(process = %self.process, "asking process to stop");
        #[cfg(unix)]
        {
            self.send_signal(nix::sys::signal::Signal::SIGTERM)
        }
        #[cfg(not(unix))]
        {
            self.force_kill()
        }
    }

    async fn ask_for_hard_stop(&self) -> ProcessHostResult<()> {
        self.readiness.interrupt();
        if !self.is_alive() {
            return Ok(());
        }
        info!(process = %self.process, "asking process to stop immediately");
        #[cfg(unix)]
        self.send_signal(nix::sys::signal::Signal::SIGQUIT)?;

        if self.wait_for_timeout(self.hard_stop_timeout).await.is_some() {
            return Ok(());
        }
        warn!(
            process = %self.process,
            timeout_ms = self.hard_stop_timeout.as_millis(),
            "process did not stop in time, killing it"
        );
        self.force_kill()?;
        if self.wait_for_timeout(self.hard_stop_timeout).await.is_none() {
            warn!(process = %self.process, "killed process has not been reaped yet");
        }
        Ok(())
    }

    async fn wait_for(&self) -> ProcessExit {
        loop {
            if let Some(exit) = self.poll_exit() {
                return exit;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}
