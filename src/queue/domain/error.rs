//! Error types for queue domain validation and parsing.

use thiserror::Error;

/// Errors returned while building queue domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueDomainError {
    /// A submission has no task type.
    #[error("task type must not be empty")]
    EmptyTaskType,

    /// A component reference has a blank uuid.
    #[error("component uuid must not be empty")]
    EmptyComponentUuid,

    /// A component reference has a blank entity uuid.
    #[error("entity uuid must not be empty")]
    EmptyEntityUuid,

    /// A characteristic key is blank.
    #[error("characteristic key must not be empty")]
    EmptyCharacteristicKey,
}

/// Error returned while parsing a queue status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown queue status: {0}")]
pub struct ParseQueueStatusError(pub String);

/// Error returned while parsing an activity status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown activity status: {0}")]
pub struct ParseActivityStatusError(pub String);
