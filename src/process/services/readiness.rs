//! Bounded-retry readiness checking on top of a single-shot probe.

use crate::process::{
    domain::{ProcessId, ReadinessPolicy},
    ports::{HealthProbe, ProbeError},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Decides whether a process is operational.
///
/// Connectivity failures and "not ready" answers are retried at a fixed
/// interval up to the policy's attempt count. A quorum wait is logged once
/// and retried. Any other probe failure ends the check immediately.
pub struct ReadinessChecker {
    process: ProcessId,
    probe: Option<Arc<dyn HealthProbe>>,
    policy: ReadinessPolicy,
    operational: AtomicBool,
    quorum_logged: AtomicBool,
    interrupt: watch::Sender<bool>,
}

impl ReadinessChecker {
    /// Creates a checker backed by `probe`.
    #[must_use]
    pub fn new(process: ProcessId, probe: Arc<dyn HealthProbe>, policy: ReadinessPolicy) -> Self {
        Self::build(process, Some(probe), policy)
    }

    /// Creates a checker for a process without a probe; it is operational
    /// as soon as it is checked.
    #[must_use]
    pub fn without_probe(process: ProcessId) -> Self {
        Self::build(process, None, ReadinessPolicy::default())
    }

    fn build(
        process: ProcessId,
        probe: Option<Arc<dyn HealthProbe>>,
        policy: ReadinessPolicy,
    ) -> Self {
        let (interrupt, _) = watch::channel(false);
        Self {
            process,
            probe,
            policy,
            operational: AtomicBool::new(false),
            quorum_logged: AtomicBool::new(false),
            interrupt,
        }
    }

    /// Runs one readiness check.
    ///
    /// Returns `true` once the probe succeeds; the result is then cached.
    /// Returns `false` when retries are exhausted, the probe fails
    /// unexpectedly, or the checker was interrupted.
    pub async fn check(&self) -> bool {
        if self.operational.load(Ordering::Acquire) {
            return true;
        }
        let Some(probe) = self.probe.as_ref() else {
            self.operational.store(true, Ordering::Release);
            return true;
        };

        let mut interrupted = self.interrupt.subscribe();
        let max_attempts = self.policy.max_attempts();
        for attempt in 1..=max_attempts {
            if self.is_interrupted() {
                debug!(process = %self.process, "readiness check interrupted");
                return false;
            }

            match probe.check().await {
                Ok(true) => {
                    self.operational.store(true, Ordering::Release);
                    return true;
                }
                Ok(false) => debug!(process = %self.process, attempt, "process not ready yet"),
                Err(ProbeError::Connectivity(reason)) => {
                    debug!(process = %self.process, attempt, %reason, "process not reachable yet");
                }
                Err(ProbeError::AwaitingQuorum(reason)) => {
                    if !self.quorum_logged.swap(true, Ordering::AcqRel) {
                        info!(process = %self.process, %reason, "waiting for cluster quorum");
                    }
                }
                Err(err @ ProbeError::Unexpected(_)) => {
                    error!(process = %self.process, error = %err, "readiness probe failed");
                    return false;
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    () = tokio::time::sleep(self.policy.delay()) => {}
                    _ = interrupted.wait_for(|flag| *flag) => {
                        debug!(process = %self.process, "readiness wait interrupted");
                        return false;
                    }
                }
            }
        }

        debug!(process = %self.process, max_attempts, "readiness retries exhausted");
        false
    }

    /// Interrupts a pending check. The interrupt stays set, so later checks
    /// return `false` unless the process was already operational.
    pub fn interrupt(&self) {
        self.interrupt.send_replace(true);
    }

    /// Returns whether [`Self::interrupt`] was called.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        *self.interrupt.borrow()
    }
}
