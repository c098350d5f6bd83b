//! In-memory queue store for tests and single-node development.
//!
//! Each transaction works on a copy of the state and publishes it only when
//! the unit of work succeeds, which gives the same all-or-nothing behaviour
//! as the database adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::queue::{
    domain::{
        Activity, ComponentRecord, DedupScope, QueueStatus, QueuedTask, TaskId, UserRecord,
    },
    ports::{QueueStore, QueueStoreError, QueueStoreResult, QueueTransaction, WorkerSelector},
};

/// Thread-safe in-memory queue store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    state: QueueState,
    contended: BTreeSet<TaskId>,
}

#[derive(Debug, Clone, Default)]
struct QueueState {
    tasks: Vec<QueuedTask>,
    activities: BTreeMap<TaskId, Activity>,
    task_inputs: BTreeMap<TaskId, Vec<u8>>,
    properties: BTreeMap<String, String>,
    components: BTreeMap<String, ComponentRecord>,
    entities: BTreeMap<String, ComponentRecord>,
    users: BTreeMap<String, UserRecord>,
}

impl InMemoryQueueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a component row.
    pub fn insert_component(&self, record: ComponentRecord) {
        self.lock()
            .state
            .components
            .insert(record.uuid.clone(), record);
    }

    /// Removes a component row.
    pub fn delete_component(&self, uuid: &str) {
        self.lock().state.components.remove(uuid);
    }

    /// Registers an entity row.
    pub fn insert_entity(&self, record: ComponentRecord) {
        self.lock().state.entities.insert(record.uuid.clone(), record);
    }

    /// Registers a user row.
    pub fn insert_user(&self, record: UserRecord) {
        self.lock().state.users.insert(record.uuid.clone(), record);
    }

    /// Attaches an input blob to a task.
    pub fn store_task_input(&self, id: TaskId, data: Vec<u8>) {
        self.lock().state.task_inputs.insert(id, data);
    }

    /// Returns whether a task still has an input blob.
    #[must_use]
    pub fn has_task_input(&self, id: TaskId) -> bool {
        self.lock().state.task_inputs.contains_key(&id)
    }

    /// Returns the committed queue rows in insertion order.
    #[must_use]
    pub fn queued_tasks(&self) -> Vec<QueuedTask> {
        self.lock().state.tasks.clone()
    }

    /// Returns the committed history row of a task.
    #[must_use]
    pub fn activity(&self, id: TaskId) -> Option<Activity> {
        self.lock().state.activities.get(&id).cloned()
    }

    /// Returns every committed history row.
    #[must_use]
    pub fn activities(&self) -> Vec<Activity> {
        self.lock().state.activities.values().cloned().collect()
    }

    /// Makes the next conditional delete of `id` behave as if another
    /// worker had removed the row first.
    pub fn contend_next_removal(&self, id: TaskId) {
        self.lock().contended.insert(id);
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<QueueStoreError> + Send + 'static,
        F: FnOnce(&mut dyn QueueTransaction) -> Result<T, E> + Send + 'static,
    {
        let mut inner = self.lock();
        let mut draft = inner.state.clone();
        let outcome = {
            let mut tx = MemoryTransaction {
                state: &mut draft,
                contended: &mut inner.contended,
            };
            work(&mut tx)
        };
        if outcome.is_ok() {
            inner.state = draft;
        }
        outcome
    }
}

struct MemoryTransaction<'a> {
    state: &'a mut QueueState,
    contended: &'a mut BTreeSet<TaskId>,
}

impl MemoryTransaction<'_> {
    fn pending(&self) -> impl Iterator<Item = &QueuedTask> {
        self.state
            .tasks
            .iter()
            .filter(|task| task.status == QueueStatus::Pending)
    }
}

impl QueueTransaction for MemoryTransaction<'_> {
    fn insert_task(&mut self, task: &QueuedTask) -> QueueStoreResult<()> {
        let exists = self.state.tasks.iter().any(|queued| queued.id == task.id)
            || self.state.activities.contains_key(&task.id);
        if exists {
            return Err(QueueStoreError::DuplicateTask(task.id));
        }
        self.state.tasks.push(task.clone());
        Ok(())
    }

    fn select_task(&mut self, id: TaskId) -> QueueStoreResult<Option<QueuedTask>> {
        Ok(self.state.tasks.iter().find(|task| task.id == id).cloned())
    }

    fn select_all_in_asc_order(&mut self) -> QueueStoreResult<Vec<QueuedTask>> {
        let mut tasks = self.state.tasks.clone();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    fn count_pending(&mut self, scope: &DedupScope) -> QueueStoreResult<usize> {
        Ok(self
            .pending()
            .filter(|task| scope.matches(task.entity_uuid.as_deref(), &task.task_type))
            .count())
    }

    fn count_pending_by_entity(
        &mut self,
        entity_uuids: &BTreeSet<String>,
    ) -> QueueStoreResult<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for entity in self
            .pending()
            .filter_map(|task| task.entity_uuid.as_ref())
            .filter(|entity| entity_uuids.contains(*entity))
        {
            *counts.entry(entity.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn count_in_progress(&mut self) -> QueueStoreResult<usize> {
        Ok(self
            .state
            .tasks
            .iter()
            .filter(|task| task.status == QueueStatus::InProgress)
            .count())
    }

    fn select_oldest_pending(&mut self) -> QueueStoreResult<Option<QueuedTask>> {
        Ok(self
            .pending()
            .min_by_key(|task| task.created_at)
            .cloned())
    }

    fn start_task_if_pending(
        &mut self,
        id: TaskId,
        worker_uuid: &str,
        now: DateTime<Utc>,
    ) -> QueueStoreResult<usize> {
        let Some(task) = self
            .state
            .tasks
            .iter_mut()
            .find(|task| task.id == id && task.status == QueueStatus::Pending)
        else {
            return Ok(0);
        };
        task.status = QueueStatus::InProgress;
        task.worker_uuid = Some(worker_uuid.to_owned());
        task.started_at = Some(now);
        task.updated_at = now;
        Ok(1)
    }

    fn reset_in_progress(
        &mut self,
        selector: &WorkerSelector,
        now: DateTime<Utc>,
    ) -> QueueStoreResult<usize> {
        let mut reset = 0;
        for task in self.state.tasks.iter_mut().filter(|task| {
            task.status == QueueStatus::InProgress && selector.selects(task.worker_uuid.as_deref())
        }) {
            task.status = QueueStatus::Pending;
            task.worker_uuid = None;
            task.started_at = None;
            task.updated_at = now;
            reset += 1;
        }
        Ok(reset)
    }

    fn insert_activity(&mut self, activity: &Activity) -> QueueStoreResult<()> {
        if self.state.activities.contains_key(&activity.id) {
            return Err(QueueStoreError::DuplicateTask(activity.id));
        }
        self.state.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    fn delete_task_input(&mut self, id: TaskId) -> QueueStoreResult<()> {
        self.state.task_inputs.remove(&id);
        Ok(())
    }

    fn delete_task_if_status(
        &mut self,
        id: TaskId,
        status: QueueStatus,
    ) -> QueueStoreResult<usize> {
        if self.contended.remove(&id) {
            return Ok(0);
        }
        let before = self.state.tasks.len();
        self.state
            .tasks
            .retain(|task| !(task.id == id && task.status == status));
        Ok(before - self.state.tasks.len())
    }

    fn select_property(&mut self, key: &str) -> QueueStoreResult<Option<String>> {
        Ok(self.state.properties.get(key).cloned())
    }

    fn upsert_property(&mut self, key: &str, value: &str) -> QueueStoreResult<()> {
        self.state
            .properties
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete_property(&mut self, key: &str) -> QueueStoreResult<()> {
        self.state.properties.remove(key);
        Ok(())
    }

    fn select_component(&mut self, uuid: &str) -> QueueStoreResult<Option<ComponentRecord>> {
        Ok(self.state.components.get(uuid).cloned())
    }

    fn select_entity(&mut self, uuid: &str) -> QueueStoreResult<Option<ComponentRecord>> {
        Ok(self.state.entities.get(uuid).cloned())
    }

    fn select_user(&mut self, uuid: &str) -> QueueStoreResult<Option<UserRecord>> {
        Ok(self.state.users.get(uuid).cloned())
    }
}
