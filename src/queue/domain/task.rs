//! Queue rows and the resolved, caller-facing task descriptor.

use super::{CeTaskSubmit, ParseQueueStatusError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of a task still in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// Waiting for a worker.
    Pending,
    /// Picked up by a worker.
    InProgress,
}

impl QueueStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for QueueStatus {
    type Error = ParseQueueStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            _ => Err(ParseQueueStatusError(value.to_owned())),
        }
    }
}

/// Persisted queue row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Task identifier.
    pub id: TaskId,
    /// Task type.
    pub task_type: String,
    /// Targeted component uuid.
    pub component_uuid: Option<String>,
    /// Targeted entity uuid.
    pub entity_uuid: Option<String>,
    /// Submitting user's uuid.
    pub submitter_uuid: Option<String>,
    /// Queue status.
    pub status: QueueStatus,
    /// Worker holding the task while in progress.
    pub worker_uuid: Option<String>,
    /// Ordered key/value characteristics.
    pub characteristics: BTreeMap<String, String>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
    /// Time a worker picked the task up.
    pub started_at: Option<DateTime<Utc>>,
}

impl QueuedTask {
    /// Builds the pending row for `submission`, submitted at `now`.
    #[must_use]
    pub fn pending(submission: &CeTaskSubmit, now: DateTime<Utc>) -> Self {
        Self {
            id: submission.id(),
            task_type: submission.task_type().to_owned(),
            component_uuid: submission
                .component()
                .map(|component| component.uuid().to_owned()),
            entity_uuid: submission.entity_uuid().map(str::to_owned),
            submitter_uuid: submission.submitter_uuid().map(str::to_owned),
            status: QueueStatus::Pending,
            worker_uuid: None,
            characteristics: submission.characteristics().clone(),
            created_at: now,
            updated_at: now,
            started_at: None,
        }
    }
}

/// Component row as stored by the rest of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Component uuid.
    pub uuid: String,
    /// Component key.
    pub key: String,
    /// Display name.
    pub name: String,
}

/// User row as stored by the rest of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User uuid.
    pub uuid: String,
    /// Login.
    pub login: String,
}

/// Component or entity referenced by a task.
///
/// `key` and `name` are absent when the referenced row no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskComponent {
    uuid: String,
    key: Option<String>,
    name: Option<String>,
}

impl TaskComponent {
    /// Descriptor for a component whose row was found.
    #[must_use]
    pub fn resolved(record: ComponentRecord) -> Self {
        Self {
            uuid: record.uuid,
            key: Some(record.key),
            name: Some(record.name),
        }
    }

    /// Descriptor carrying only the known uuid.
    #[must_use]
    pub fn unresolved(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            key: None,
            name: None,
        }
    }

    /// Returns the uuid.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns the key, when resolved.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the name, when resolved.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// User who submitted a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    uuid: String,
    login: Option<String>,
}

impl Submitter {
    /// Descriptor for a user whose row was found.
    #[must_use]
    pub fn resolved(record: UserRecord) -> Self {
        Self {
            uuid: record.uuid,
            login: Some(record.login),
        }
    }

    /// Descriptor carrying only the known uuid.
    #[must_use]
    pub fn unresolved(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            login: None,
        }
    }

    /// Returns the uuid.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns the login, when resolved.
    #[must_use]
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }
}

/// Task as returned to callers, with its references resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeTask {
    id: TaskId,
    task_type: String,
    component: Option<TaskComponent>,
    entity: Option<TaskComponent>,
    submitter: Option<Submitter>,
    characteristics: BTreeMap<String, String>,
}

/// Parts of a resolved task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeTaskParts {
    /// Task identifier.
    pub id: TaskId,
    /// Task type.
    pub task_type: String,
    /// Resolved component.
    pub component: Option<TaskComponent>,
    /// Resolved entity.
    pub entity: Option<TaskComponent>,
    /// Resolved submitter.
    pub submitter: Option<Submitter>,
    /// Characteristics.
    pub characteristics: BTreeMap<String, String>,
}

impl CeTask {
    /// Assembles a task from resolved parts.
    #[must_use]
    pub fn from_parts(parts: CeTaskParts) -> Self {
        Self {
            id: parts.id,
            task_type: parts.task_type,
            component: parts.component,
            entity: parts.entity,
            submitter: parts.submitter,
            characteristics: parts.characteristics,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task type.
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Returns the targeted component.
    #[must_use]
    pub const fn component(&self) -> Option<&TaskComponent> {
        self.component.as_ref()
    }

    /// Returns the targeted entity.
    #[must_use]
    pub const fn entity(&self) -> Option<&TaskComponent> {
        self.entity.as_ref()
    }

    /// Returns the submitter.
    #[must_use]
    pub const fn submitter(&self) -> Option<&Submitter> {
        self.submitter.as_ref()
    }

    /// Returns the characteristics.
    #[must_use]
    pub const fn characteristics(&self) -> &BTreeMap<String, String> {
        &self.characteristics
    }
}
