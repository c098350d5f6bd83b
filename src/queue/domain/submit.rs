//! Incoming task submissions and their deduplication scope.

use super::{QueueDomainError, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Component a submission targets, with the entity (project, branch, or
/// portfolio) it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmitComponent {
    uuid: String,
    entity_uuid: String,
}

impl SubmitComponent {
    /// Creates a component reference.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError`] when either uuid is blank.
    pub fn new(
        uuid: impl Into<String>,
        entity_uuid: impl Into<String>,
    ) -> Result<Self, QueueDomainError> {
        let normalized_uuid = uuid.into().trim().to_owned();
        if normalized_uuid.is_empty() {
            return Err(QueueDomainError::EmptyComponentUuid);
        }
        let normalized_entity = entity_uuid.into().trim().to_owned();
        if normalized_entity.is_empty() {
            return Err(QueueDomainError::EmptyEntityUuid);
        }
        Ok(Self {
            uuid: normalized_uuid,
            entity_uuid: normalized_entity,
        })
    }

    /// Creates a reference to a component that is its own entity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::EmptyComponentUuid`] when `uuid` is blank.
    pub fn entity(uuid: impl Into<String>) -> Result<Self, QueueDomainError> {
        let normalized = uuid.into();
        Self::new(normalized.clone(), normalized).map_err(|_| QueueDomainError::EmptyComponentUuid)
    }

    /// Returns the component uuid.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns the entity uuid.
    #[must_use]
    pub fn entity_uuid(&self) -> &str {
        &self.entity_uuid
    }
}

/// Immutable description of a task to enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeTaskSubmit {
    id: TaskId,
    task_type: String,
    component: Option<SubmitComponent>,
    submitter_uuid: Option<String>,
    characteristics: BTreeMap<String, String>,
}

impl CeTaskSubmit {
    /// Returns the pre-generated task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task type.
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Returns the targeted component, if any.
    #[must_use]
    pub const fn component(&self) -> Option<&SubmitComponent> {
        self.component.as_ref()
    }

    /// Returns the targeted entity uuid, if any.
    #[must_use]
    pub fn entity_uuid(&self) -> Option<&str> {
        self.component.as_ref().map(SubmitComponent::entity_uuid)
    }

    /// Returns the submitting user's uuid, if any.
    #[must_use]
    pub fn submitter_uuid(&self) -> Option<&str> {
        self.submitter_uuid.as_deref()
    }

    /// Returns the characteristics.
    #[must_use]
    pub const fn characteristics(&self) -> &BTreeMap<String, String> {
        &self.characteristics
    }
}

/// Builder for [`CeTaskSubmit`], seeded with a fresh task identifier.
#[derive(Debug, Clone)]
pub struct TaskSubmitBuilder {
    id: TaskId,
    task_type: Option<String>,
    component: Option<SubmitComponent>,
    submitter_uuid: Option<String>,
    characteristics: BTreeMap<String, String>,
}

impl TaskSubmitBuilder {
    /// Creates a builder for the task `id`.
    #[must_use]
    pub const fn new(id: TaskId) -> Self {
        Self {
            id,
            task_type: None,
            component: None,
            submitter_uuid: None,
            characteristics: BTreeMap::new(),
        }
    }

    /// Returns the task identifier the submission will carry.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Sets the task type.
    #[must_use]
    pub fn set_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Sets the targeted component.
    #[must_use]
    pub fn set_component(mut self, component: SubmitComponent) -> Self {
        self.component = Some(component);
        self
    }

    /// Sets the submitting user's uuid.
    #[must_use]
    pub fn set_submitter_uuid(mut self, submitter_uuid: impl Into<String>) -> Self {
        self.submitter_uuid = Some(submitter_uuid.into());
        self
    }

    /// Replaces the characteristics. Later duplicates of a key win.
    #[must_use]
    pub fn set_characteristics(
        mut self,
        characteristics: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.characteristics = characteristics.into_iter().collect();
        self
    }

    /// Builds the submission.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::EmptyTaskType`] when no type was set or
    /// it is blank, and [`QueueDomainError::EmptyCharacteristicKey`] when a
    /// characteristic key is blank.
    pub fn build(self) -> Result<CeTaskSubmit, QueueDomainError> {
        let task_type = self
            .task_type
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or(QueueDomainError::EmptyTaskType)?;
        if self.characteristics.keys().any(|key| key.trim().is_empty()) {
            return Err(QueueDomainError::EmptyCharacteristicKey);
        }

        Ok(CeTaskSubmit {
            id: self.id,
            task_type,
            component: self.component,
            submitter_uuid: self
                .submitter_uuid
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            characteristics: self.characteristics,
        })
    }
}

/// Deduplication requested when submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitOption {
    /// Skip the submission when the entity already has a pending task.
    UniqueQueuePerEntity,
    /// Skip the submission when a pending task of the same type exists.
    UniqueQueuePerTaskType,
}

/// Pending tasks a submission conflicts with.
///
/// Both criteria apply together when both are set. An empty scope
/// conflicts with nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupScope {
    entity_uuid: Option<String>,
    task_type: Option<String>,
}

impl DedupScope {
    /// Derives the scope of `submission` under `options`.
    ///
    /// Per-entity uniqueness only applies to submissions targeting a
    /// component.
    #[must_use]
    pub fn for_submission(submission: &CeTaskSubmit, options: &[SubmitOption]) -> Self {
        let entity_uuid = options
            .contains(&SubmitOption::UniqueQueuePerEntity)
            .then(|| submission.entity_uuid().map(str::to_owned))
            .flatten();
        let task_type = options
            .contains(&SubmitOption::UniqueQueuePerTaskType)
            .then(|| submission.task_type().to_owned());
        Self {
            entity_uuid,
            task_type,
        }
    }

    /// Returns the entity criterion.
    #[must_use]
    pub fn entity_uuid(&self) -> Option<&str> {
        self.entity_uuid.as_deref()
    }

    /// Returns the task type criterion.
    #[must_use]
    pub fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    /// Returns whether the scope has no criterion.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entity_uuid.is_none() && self.task_type.is_none()
    }

    /// Returns whether a pending task with `entity_uuid` and `task_type`
    /// falls in the scope.
    #[must_use]
    pub fn matches(&self, entity_uuid: Option<&str>, task_type: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let entity_matches = self
            .entity_uuid
            .as_deref()
            .is_none_or(|expected| entity_uuid == Some(expected));
        let type_matches = self
            .task_type
            .as_deref()
            .is_none_or(|expected| expected == task_type);
        entity_matches && type_matches
    }
}
