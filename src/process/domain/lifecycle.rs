//! Lifecycle state machines for supervised processes and the node as a whole.

use super::{ProcessDomainError, ProcessId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessLifecycleState {
    /// Not launched yet, or waiting to be relaunched.
    Init,
    /// Launched and waiting for its readiness probe to succeed.
    Starting,
    /// Launched and reported ready.
    Operational,
    /// Asked to finish current work and exit.
    Stopping,
    /// Asked to exit immediately.
    HardStopping,
    /// Exited.
    Stopped,
}

impl ProcessLifecycleState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Starting => "starting",
            Self::Operational => "operational",
            Self::Stopping => "stopping",
            Self::HardStopping => "hard_stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Init, Self::Starting | Self::Stopped)
                | (
                    Self::Starting,
                    Self::Operational | Self::Stopping | Self::HardStopping | Self::Stopped
                )
                | (
                    Self::Operational,
                    Self::Stopping | Self::HardStopping | Self::Stopped
                )
                | (Self::Stopping, Self::HardStopping | Self::Stopped)
                | (Self::HardStopping, Self::Stopped)
                | (Self::Stopped, Self::Init)
        )
    }

    /// Returns the target state if the transition is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::InvalidLifecycleTransition`] when the
    /// state machine forbids moving from `self` to `target`.
    pub fn transition(self, process: ProcessId, target: Self) -> Result<Self, ProcessDomainError> {
        if self.can_transition_to(target) {
            return Ok(target);
        }
        Err(ProcessDomainError::InvalidLifecycleTransition {
            process,
            from: self.as_str().to_owned(),
            to: target.as_str().to_owned(),
        })
    }
}

impl fmt::Display for ProcessLifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lifecycle state of the node, derived from the scheduler's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLifecycle {
    /// Scheduler built but not scheduled.
    Init,
    /// Processes are being launched.
    Starting,
    /// Every configured process is operational.
    Operational,
    /// Graceful shutdown in progress.
    Stopping,
    /// Immediate shutdown in progress.
    HardStopping,
    /// Every process has exited.
    Stopped,
}

impl NodeLifecycle {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Starting => "starting",
            Self::Operational => "operational",
            Self::Stopping => "stopping",
            Self::HardStopping => "hard_stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Returns whether a shutdown has begun or completed.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::Stopping | Self::HardStopping | Self::Stopped)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Init,
                Self::Starting | Self::Stopping | Self::HardStopping
            ) | (
                Self::Starting,
                Self::Operational | Self::Stopping | Self::HardStopping
            ) | (
                Self::Operational,
                Self::Starting | Self::Stopping | Self::HardStopping
            ) | (Self::Stopping, Self::HardStopping | Self::Stopped)
                | (Self::HardStopping, Self::Stopped)
        )
    }

    /// Returns the target state if the transition is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::InvalidNodeTransition`] when the state
    /// machine forbids moving from `self` to `target`.
    pub fn transition(self, target: Self) -> Result<Self, ProcessDomainError> {
        if self.can_transition_to(target) {
            return Ok(target);
        }
        Err(ProcessDomainError::InvalidNodeTransition {
            from: self.as_str().to_owned(),
            to: target.as_str().to_owned(),
        })
    }
}

impl fmt::Display for NodeLifecycle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
