//! Kinds of externally requested shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Urgency of an external stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRequestKind {
    /// Let in-flight work finish, then exit.
    Graceful,
    /// Exit now without draining.
    Hard,
}

impl StopRequestKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for StopRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
