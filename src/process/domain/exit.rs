//! Exit outcomes of supervised processes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code a child uses to ask the node to relaunch it.
pub const RESTART_EXIT_CODE: i32 = 64;

/// Outcome of a process that has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessExit {
    code: Option<i32>,
}

impl ProcessExit {
    /// Creates an exit outcome from a raw exit code.
    ///
    /// `None` means the process was terminated by a signal.
    #[must_use]
    pub const fn from_code(code: Option<i32>) -> Self {
        Self { code }
    }

    /// Outcome of a process that exited cleanly.
    #[must_use]
    pub const fn success() -> Self {
        Self { code: Some(0) }
    }

    /// Outcome of a process that asked to be relaunched.
    #[must_use]
    pub const fn restart_requested() -> Self {
        Self {
            code: Some(RESTART_EXIT_CODE),
        }
    }

    /// Returns the raw exit code.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        self.code
    }

    /// Returns whether the process exited with status zero.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Returns whether the process asked to be relaunched.
    #[must_use]
    pub const fn asked_for_restart(self) -> bool {
        matches!(self.code, Some(RESTART_EXIT_CODE))
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}
