//! Worker pause state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether compute workers may pick up new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkersPauseStatus {
    /// Workers pick up pending tasks.
    Resumed,
    /// A pause was requested but tasks are still in progress.
    Pausing,
    /// A pause was requested and no task is in progress.
    Paused,
}

impl WorkersPauseStatus {
    /// Derives the status from the pause flag and the in-progress count.
    #[must_use]
    pub const fn derive(pause_requested: bool, in_progress: usize) -> Self {
        match (pause_requested, in_progress) {
            (false, _) => Self::Resumed,
            (true, 0) => Self::Paused,
            (true, _) => Self::Pausing,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resumed => "RESUMED",
            Self::Pausing => "PAUSING",
            Self::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for WorkersPauseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
