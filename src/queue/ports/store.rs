//! Transactional persistence port for the compute queue.

use crate::queue::domain::{
    Activity, ComponentRecord, DedupScope, QueueStatus, QueuedTask, TaskId, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Result type for queue store operations.
pub type QueueStoreResult<T> = Result<T, QueueStoreError>;

/// Selects in-progress rows by the worker holding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSelector {
    /// Rows held by this worker.
    Only(String),
    /// Rows held by a worker outside this set, or by no worker at all.
    NotIn(BTreeSet<String>),
}

impl WorkerSelector {
    /// Returns whether a row held by `worker_uuid` is selected.
    #[must_use]
    pub fn selects(&self, worker_uuid: Option<&str>) -> bool {
        match self {
            Self::Only(expected) => worker_uuid == Some(expected.as_str()),
            Self::NotIn(known) => worker_uuid.is_none_or(|worker| !known.contains(worker)),
        }
    }
}

/// Operations available inside one store transaction.
///
/// Every change made through the transaction commits together when the
/// enclosing unit of work succeeds, and is discarded when it fails.
pub trait QueueTransaction {
    /// Inserts a queue row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueStoreError::DuplicateTask`] when the id is already
    /// queued or archived.
    fn insert_task(&mut self, task: &QueuedTask) -> QueueStoreResult<()>;

    /// Loads a queue row.
    fn select_task(&mut self, id: TaskId) -> QueueStoreResult<Option<QueuedTask>>;

    /// Loads every queue row, oldest first.
    fn select_all_in_asc_order(&mut self) -> QueueStoreResult<Vec<QueuedTask>>;

    /// Counts pending rows inside `scope`.
    fn count_pending(&mut self, scope: &DedupScope) -> QueueStoreResult<usize>;

    /// Counts pending rows for each of `entity_uuids`.
    ///
    /// Entities without pending rows are absent from the result.
    fn count_pending_by_entity(
        &mut self,
        entity_uuids: &BTreeSet<String>,
    ) -> QueueStoreResult<BTreeMap<String, usize>>;

    /// Counts in-progress rows.
    fn count_in_progress(&mut self) -> QueueStoreResult<usize>;

    /// Loads the oldest pending row.
    fn select_oldest_pending(&mut self) -> QueueStoreResult<Option<QueuedTask>>;

    /// Marks a row in progress for `worker_uuid` if it is still pending.
    ///
    /// Returns the number of rows updated.
    fn start_task_if_pending(
        &mut self,
        id: TaskId,
        worker_uuid: &str,
        now: DateTime<Utc>,
    ) -> QueueStoreResult<usize>;

    /// Moves selected in-progress rows back to pending.
    ///
    /// Returns the number of rows updated.
    fn reset_in_progress(
        &mut self,
        selector: &WorkerSelector,
        now: DateTime<Utc>,
    ) -> QueueStoreResult<usize>;

    /// Inserts a history row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueStoreError::DuplicateTask`] when the id is already
    /// archived.
    fn insert_activity(&mut self, activity: &Activity) -> QueueStoreResult<()>;

    /// Deletes the input blob of a task, if any.
    fn delete_task_input(&mut self, id: TaskId) -> QueueStoreResult<()>;

    /// Deletes a queue row only while it still has `status`.
    ///
    /// Returns the number of rows deleted.
    fn delete_task_if_status(&mut self, id: TaskId, status: QueueStatus)
    -> QueueStoreResult<usize>;

    /// Loads an internal property value.
    fn select_property(&mut self, key: &str) -> QueueStoreResult<Option<String>>;

    /// Inserts or replaces an internal property value.
    fn upsert_property(&mut self, key: &str, value: &str) -> QueueStoreResult<()>;

    /// Deletes an internal property.
    fn delete_property(&mut self, key: &str) -> QueueStoreResult<()>;

    /// Looks up a component row.
    fn select_component(&mut self, uuid: &str) -> QueueStoreResult<Option<ComponentRecord>>;

    /// Looks up an entity row.
    fn select_entity(&mut self, uuid: &str) -> QueueStoreResult<Option<ComponentRecord>>;

    /// Looks up a user row.
    fn select_user(&mut self, uuid: &str) -> QueueStoreResult<Option<UserRecord>>;
}

/// Queue persistence contract.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Runs `work` inside one transaction.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, or a [`QueueStoreError`]
    /// converted into `E` when the transaction cannot be opened or
    /// committed.
    async fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<QueueStoreError> + Send + 'static,
        F: FnOnce(&mut dyn QueueTransaction) -> Result<T, E> + Send + 'static;
}

/// Errors returned by queue store implementations.
#[derive(Debug, Clone, Error)]
pub enum QueueStoreError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl QueueStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
