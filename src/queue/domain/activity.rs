//! History rows written when a task leaves the queue.

use super::{ParseActivityStatusError, QueuedTask, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    /// Completed successfully.
    Success,
    /// Completed with an error.
    Failed,
    /// Removed before completion.
    Canceled,
}

impl ActivityStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ActivityStatus {
    type Error = ParseActivityStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            _ => Err(ParseActivityStatusError(value.to_owned())),
        }
    }
}

/// Error details recorded with a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Error category, such as an exception type.
    pub error_type: Option<String>,
    /// Human-readable message.
    pub error_message: Option<String>,
}

impl TaskFailure {
    /// Creates failure details.
    #[must_use]
    pub fn new(error_type: Option<String>, error_message: Option<String>) -> Self {
        Self {
            error_type,
            error_message,
        }
    }
}

/// Persisted history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Task identifier, shared with the former queue row.
    pub id: TaskId,
    /// Task type.
    pub task_type: String,
    /// Targeted component uuid.
    pub component_uuid: Option<String>,
    /// Targeted entity uuid.
    pub entity_uuid: Option<String>,
    /// Submitting user's uuid.
    pub submitter_uuid: Option<String>,
    /// Worker that held the task, if any.
    pub worker_uuid: Option<String>,
    /// Terminal status.
    pub status: ActivityStatus,
    /// Error category for failed tasks.
    pub error_type: Option<String>,
    /// Error message for failed tasks.
    pub error_message: Option<String>,
    /// Milliseconds from start to completion, `0` when never started.
    pub execution_time_ms: i64,
    /// Node that recorded the activity.
    pub node_name: Option<String>,
    /// Characteristics copied from the queue row.
    pub characteristics: BTreeMap<String, String>,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Time a worker picked the task up.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the task left the queue.
    pub executed_at: DateTime<Utc>,
}

impl Activity {
    /// Builds the history row for `task` leaving the queue at `now`.
    #[must_use]
    pub fn from_queued(
        task: &QueuedTask,
        status: ActivityStatus,
        failure: Option<TaskFailure>,
        now: DateTime<Utc>,
        node_name: Option<String>,
    ) -> Self {
        let TaskFailure {
            error_type,
            error_message,
        } = failure.unwrap_or_default();
        Self {
            id: task.id,
            task_type: task.task_type.clone(),
            component_uuid: task.component_uuid.clone(),
            entity_uuid: task.entity_uuid.clone(),
            submitter_uuid: task.submitter_uuid.clone(),
            worker_uuid: task.worker_uuid.clone(),
            status,
            error_type,
            error_message,
            execution_time_ms: execution_time_ms(task.started_at, now),
            node_name,
            characteristics: task.characteristics.clone(),
            submitted_at: task.created_at,
            started_at: task.started_at,
            executed_at: now,
        }
    }
}

fn execution_time_ms(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    started_at.map_or(0, |started| (now - started).num_milliseconds().max(0))
}
