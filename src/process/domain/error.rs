//! Error types for process domain validation and parsing.

use super::ProcessId;
use thiserror::Error;

/// Errors returned while constructing or transitioning process domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessDomainError {
    /// The launch command program is empty after trimming.
    #[error("launch command must not be empty")]
    EmptyProgram,

    /// The working directory is empty after trimming.
    #[error("working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// A health check address is empty after trimming.
    #[error("health check address must not be empty")]
    EmptyHealthAddress,

    /// An HTTP health check path does not start with `/`.
    #[error("health check path must start with '/': {0}")]
    InvalidHealthPath(String),

    /// A node plan contains no process.
    #[error("a node must supervise at least one process")]
    EmptyPlan,

    /// A node plan declares the same process twice.
    #[error("process {0} is declared more than once")]
    DuplicateProcess(ProcessId),

    /// A process lists itself as a startup dependency.
    #[error("process {0} cannot depend on itself")]
    SelfDependency(ProcessId),

    /// A process depends on a process that is not configured on this node.
    #[error("process {process} depends on {dependency}, which is not configured")]
    UnknownDependency {
        /// Dependent process.
        process: ProcessId,
        /// Missing dependency.
        dependency: ProcessId,
    },

    /// Startup dependencies form a cycle, so the process could never start.
    #[error("process {0} is part of a startup dependency cycle")]
    DependencyCycle(ProcessId),

    /// Transitioning a process between two lifecycle states is invalid.
    #[error("invalid lifecycle transition for process {process}: {from} -> {to}")]
    InvalidLifecycleTransition {
        /// Process whose state was changed.
        process: ProcessId,
        /// Current lifecycle state.
        from: String,
        /// Requested target lifecycle state.
        to: String,
    },

    /// Transitioning the node between two lifecycle states is invalid.
    #[error("invalid node lifecycle transition: {from} -> {to}")]
    InvalidNodeTransition {
        /// Current node state.
        from: String,
        /// Requested node state.
        to: String,
    },
}

/// Error returned while parsing a process key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown process key: {0}")]
pub struct ParseProcessIdError(pub String);
