//! Identifiers for the processes supervised on a node.

use super::ParseProcessIdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the OS-level processes that make up a node.
///
/// The declaration order is the default startup order: the search node
/// first, then the web server, then the compute engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessId {
    /// Search index node.
    #[serde(rename = "search")]
    SearchNode,
    /// Web server serving the UI and API.
    #[serde(rename = "web")]
    WebServer,
    /// Compute engine running queued analysis tasks.
    #[serde(rename = "ce")]
    ComputeEngine,
}

impl ProcessId {
    /// All process identifiers in default startup order.
    pub const ALL: [Self; 3] = [Self::SearchNode, Self::WebServer, Self::ComputeEngine];

    /// Returns the short key used in configuration and logs.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::SearchNode => "search",
            Self::WebServer => "web",
            Self::ComputeEngine => "ce",
        }
    }

    /// Returns a human-readable process name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::SearchNode => "Search node",
            Self::WebServer => "Web server",
            Self::ComputeEngine => "Compute engine",
        }
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl TryFrom<&str> for ProcessId {
    type Error = ParseProcessIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "search" => Ok(Self::SearchNode),
            "web" => Ok(Self::WebServer),
            "ce" => Ok(Self::ComputeEngine),
            _ => Err(ParseProcessIdError(value.to_owned())),
        }
    }
}
