//! Readiness and restart policies applied by the scheduler.

use super::ProcessExit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry policy for readiness probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    delay: Duration,
    max_attempts: u32,
}

impl ReadinessPolicy {
    /// Creates a policy. A zero attempt count is raised to one.
    #[must_use]
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the pause between two attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the maximum number of probe attempts per readiness check.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 50)
    }
}

/// Decides whether an exited process is relaunched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RestartPolicy {
    /// Never relaunch; any exit stops the node.
    Never,
    /// Relaunch only when the process asked for it.
    #[default]
    OnRequest,
    /// Relaunch on request or on a non-zero exit, up to `max_restarts` times.
    OnFailure {
        /// Upper bound on relaunches per process.
        max_restarts: u32,
    },
}

impl RestartPolicy {
    /// Returns whether a process that exited with `exit`, after having been
    /// relaunched `restarts` times already, should be relaunched again.
    #[must_use]
    pub const fn should_restart(self, exit: ProcessExit, restarts: u32) -> bool {
        match self {
            Self::Never => false,
            Self::OnRequest => exit.asked_for_restart(),
            Self::OnFailure { max_restarts } => {
                (exit.asked_for_restart() || !exit.is_success()) && restarts < max_restarts
            }
        }
    }
}
