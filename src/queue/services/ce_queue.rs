//! Compute task queue service.
//!
//! Every operation runs as one store transaction and re-derives state from
//! the store, so several nodes can share one queue. Moving a task to history
//! is guarded by a conditional delete on the status read at the start of the
//! transaction; losing that race rolls the move back.

use crate::queue::{
    domain::{
        Activity, ActivityStatus, CeTask, CeTaskParts, CeTaskSubmit, DedupScope, QueueDomainError,
        QueueStatus, QueuedTask, Submitter, SubmitOption, TaskComponent, TaskFailure, TaskId,
        TaskSubmitBuilder, WorkersPauseStatus,
    },
    ports::{QueueStore, QueueStoreError, QueueStoreResult, QueueTransaction, WorkerSelector},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Internal property holding the worker pause flag.
pub const PAUSE_PROPERTY_KEY: &str = "ce.pause";

/// Service-level errors for queue operations.
#[derive(Debug, Error)]
pub enum CeQueueError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] QueueDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] QueueStoreError),
    /// The task is not in a state that allows the operation.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// The caller passed an argument the operation rejects.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for queue service operations.
pub type CeQueueResult<T> = Result<T, CeQueueError>;

/// Outcome of a failed transaction body.
enum TxFailure {
    Queue(CeQueueError),
    /// The conditional delete matched no row.
    Lost(TaskId),
}

impl From<QueueStoreError> for TxFailure {
    fn from(err: QueueStoreError) -> Self {
        Self::Queue(CeQueueError::Store(err))
    }
}

impl From<CeQueueError> for TxFailure {
    fn from(err: CeQueueError) -> Self {
        Self::Queue(err)
    }
}

/// Durable FIFO queue of compute tasks.
#[derive(Clone)]
pub struct CeQueue<S, C>
where
    S: QueueStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    node_name: Option<String>,
}

impl<S, C> CeQueue<S, C>
where
    S: QueueStore,
    C: Clock + Send + Sync,
{
    /// Creates a queue service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            store,
            clock,
            node_name: None,
        }
    }

    /// Records `node_name` on every history row written by this service.
    #[must_use]
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// Returns a submission builder seeded with a fresh task identifier.
    #[must_use]
    pub fn prepare_submit(&self) -> TaskSubmitBuilder {
        TaskSubmitBuilder::new(TaskId::new())
    }

    /// Enqueues `submission` unless a pending task conflicts with it.
    ///
    /// Returns `None` when a uniqueness option matched an existing pending
    /// task.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails or the task id is
    /// already known.
    pub async fn submit(
        &self,
        submission: CeTaskSubmit,
        options: &[SubmitOption],
    ) -> CeQueueResult<Option<CeTask>> {
        let now = self.clock.utc();
        let scope = DedupScope::for_submission(&submission, options);
        let submitted = self
            .store
            .transaction(move |tx| -> CeQueueResult<Option<CeTask>> {
                if !scope.is_empty() && tx.count_pending(&scope)? > 0 {
                    return Ok(None);
                }
                let queued = QueuedTask::pending(&submission, now);
                tx.insert_task(&queued)?;
                Ok(Some(resolve(tx, &queued)?))
            })
            .await?;

        let Some(task) = submitted else {
            debug!("submission skipped: a pending task already covers its scope");
            return Ok(None);
        };
        info!(task_id = %task.id(), task_type = task.task_type(), "task submitted");
        Ok(Some(task))
    }

    /// Enqueues a batch of submissions in one transaction.
    ///
    /// With [`SubmitOption::UniqueQueuePerEntity`], pending counts are read
    /// once for the whole batch; an entity with pending tasks gets nothing,
    /// and an entity without gets only its first submission of the batch.
    /// [`SubmitOption::UniqueQueuePerTaskType`] is checked per submission,
    /// so it also sees earlier submissions of the same batch.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails; nothing from the
    /// batch is enqueued in that case.
    pub async fn mass_submit(
        &self,
        submissions: Vec<CeTaskSubmit>,
        options: &[SubmitOption],
    ) -> CeQueueResult<Vec<CeTask>> {
        let now = self.clock.utc();
        let per_entity = options.contains(&SubmitOption::UniqueQueuePerEntity);
        let per_type: Vec<SubmitOption> = options
            .iter()
            .copied()
            .filter(|option| *option == SubmitOption::UniqueQueuePerTaskType)
            .collect();

        let submitted = self
            .store
            .transaction(move |tx| -> CeQueueResult<Vec<CeTask>> {
                let admitted = if per_entity {
                    first_per_idle_entity(tx, submissions)?
                } else {
                    submissions
                };

                let mut tasks = Vec::with_capacity(admitted.len());
                for submission in admitted {
                    let scope = DedupScope::for_submission(&submission, &per_type);
                    if !scope.is_empty() && tx.count_pending(&scope)? > 0 {
                        continue;
                    }
                    let queued = QueuedTask::pending(&submission, now);
                    tx.insert_task(&queued)?;
                    tasks.push(resolve(tx, &queued)?);
                }
                Ok(tasks)
            })
            .await?;

        info!(count = submitted.len(), "tasks submitted in batch");
        Ok(submitted)
    }

    /// Cancels a pending task, moving it to history as `CANCELED`.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::IllegalState`] when the task is no longer
    /// queued or is in progress.
    pub async fn cancel(&self, task_id: TaskId) -> CeQueueResult<()> {
        let now = self.clock.utc();
        let node_name = self.node_name.clone();
        self.run_removal(move |tx| {
            let task = select_queued(tx, task_id)?;
            if task.status != QueueStatus::Pending {
                return Err(CeQueueError::IllegalState(format!(
                    "Task is in progress and can't be canceled [uuid={task_id}]"
                ))
                .into());
            }
            remove_in(tx, &task, ActivityStatus::Canceled, None, now, node_name)
        })
        .await?;
        Ok(())
    }

    /// Marks an in-progress task as failed, moving it to history.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::IllegalState`] when the task is no longer
    /// queued or is not in progress.
    pub async fn fail(&self, task_id: TaskId, failure: TaskFailure) -> CeQueueResult<()> {
        let now = self.clock.utc();
        let node_name = self.node_name.clone();
        self.run_removal(move |tx| {
            let task = select_queued(tx, task_id)?;
            if task.status != QueueStatus::InProgress {
                return Err(CeQueueError::IllegalState(format!(
                    "Task is not in-progress and can't be marked as failed [uuid={task_id}]"
                ))
                .into());
            }
            remove_in(
                tx,
                &task,
                ActivityStatus::Failed,
                Some(failure),
                now,
                node_name,
            )
        })
        .await?;
        Ok(())
    }

    /// Records the outcome reported by the worker holding a task.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::InvalidArgument`] for a `CANCELED` status or
    /// a `SUCCESS` carrying error details, and [`CeQueueError::IllegalState`]
    /// when the task is no longer queued.
    pub async fn remove(
        &self,
        task_id: TaskId,
        status: ActivityStatus,
        failure: Option<TaskFailure>,
    ) -> CeQueueResult<()> {
        match (status, &failure) {
            (ActivityStatus::Canceled, _) => {
                return Err(CeQueueError::InvalidArgument(format!(
                    "Task can't be removed with status {status} [uuid={task_id}]"
                )));
            }
            (ActivityStatus::Success, Some(_)) => {
                return Err(CeQueueError::InvalidArgument(format!(
                    "Error can be provided only when status is FAILED [uuid={task_id}]"
                )));
            }
            _ => {}
        }

        let now = self.clock.utc();
        let node_name = self.node_name.clone();
        self.run_removal(move |tx| {
            let task = select_queued(tx, task_id)?;
            remove_in(tx, &task, status, failure, now, node_name)
        })
        .await?;
        Ok(())
    }

    /// Cancels every queued task, oldest first.
    ///
    /// In-progress tasks are skipped unless `include_in_progress` is set.
    /// Returns the number of tasks moved to history.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails. Tasks cancelled
    /// before the failure stay cancelled.
    pub async fn cancel_all(&self, include_in_progress: bool) -> CeQueueResult<usize> {
        let queued = self
            .store
            .transaction(|tx| -> CeQueueResult<Vec<QueuedTask>> {
                Ok(tx.select_all_in_asc_order()?)
            })
            .await?;

        let mut cancelled = 0;
        for task in queued {
            if task.status == QueueStatus::InProgress && !include_in_progress {
                continue;
            }
            let now = self.clock.utc();
            let node_name = self.node_name.clone();
            let moved = self
                .run_removal(move |tx| {
                    remove_in(tx, &task, ActivityStatus::Canceled, None, now, node_name)
                })
                .await?;
            if moved {
                cancelled += 1;
            }
        }
        info!(cancelled, include_in_progress, "queue cancelled");
        Ok(cancelled)
    }

    /// Cancels every queued task, including those in progress.
    ///
    /// # Errors
    ///
    /// See [`CeQueue::cancel_all`].
    pub async fn clear(&self) -> CeQueueResult<usize> {
        self.cancel_all(true).await
    }

    /// Persists the worker pause flag.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails.
    pub async fn pause_workers(&self) -> CeQueueResult<()> {
        self.store
            .transaction(|tx| -> CeQueueResult<()> {
                Ok(tx.upsert_property(PAUSE_PROPERTY_KEY, "true")?)
            })
            .await?;
        info!("compute workers paused");
        Ok(())
    }

    /// Clears the worker pause flag.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails.
    pub async fn resume_workers(&self) -> CeQueueResult<()> {
        self.store
            .transaction(|tx| -> CeQueueResult<()> {
                Ok(tx.delete_property(PAUSE_PROPERTY_KEY)?)
            })
            .await?;
        info!("compute workers resumed");
        Ok(())
    }

    /// Derives the pause status from the stored flag and live in-progress
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails.
    pub async fn workers_pause_status(&self) -> CeQueueResult<WorkersPauseStatus> {
        self.store
            .transaction(|tx| -> CeQueueResult<WorkersPauseStatus> {
                if !pause_requested(tx)? {
                    return Ok(WorkersPauseStatus::Resumed);
                }
                let in_progress = tx.count_in_progress()?;
                Ok(WorkersPauseStatus::derive(true, in_progress))
            })
            .await
    }

    /// Hands the oldest pending task to `worker_uuid`.
    ///
    /// Tasks the same worker still holds are returned to pending first.
    /// Returns `None` while workers are paused, when the queue has no
    /// pending task, or when another worker took the candidate first.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::InvalidArgument`] for a blank worker uuid and
    /// [`CeQueueError::Store`] when the store fails.
    pub async fn peek(&self, worker_uuid: &str) -> CeQueueResult<Option<CeTask>> {
        let worker = worker_uuid.trim().to_owned();
        if worker.is_empty() {
            return Err(CeQueueError::InvalidArgument(
                "worker uuid must not be empty".to_owned(),
            ));
        }
        let now = self.clock.utc();
        let log_worker = worker.clone();
        let peeked = self
            .store
            .transaction(move |tx| -> CeQueueResult<Option<CeTask>> {
                if pause_requested(tx)? {
                    return Ok(None);
                }
                let reset = tx.reset_in_progress(&WorkerSelector::Only(worker.clone()), now)?;
                if reset > 0 {
                    debug!(worker = %worker, reset, "stale in-progress tasks returned to queue");
                }
                let Some(candidate) = tx.select_oldest_pending()? else {
                    return Ok(None);
                };
                if tx.start_task_if_pending(candidate.id, &worker, now)? == 0 {
                    return Ok(None);
                }
                let started = tx.select_task(candidate.id)?.ok_or_else(|| {
                    CeQueueError::IllegalState(format!(
                        "Task does not exist anymore [uuid={}]",
                        candidate.id
                    ))
                })?;
                Ok(Some(resolve(tx, &started)?))
            })
            .await?;

        if let Some(task) = &peeked {
            info!(task_id = %task.id(), worker = %log_worker, "task handed to worker");
        }
        Ok(peeked)
    }

    /// Returns in-progress tasks held by workers outside `known_workers` to
    /// pending.
    ///
    /// Returns the number of tasks reset.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails.
    pub async fn reset_tasks_with_unknown_workers(
        &self,
        known_workers: &BTreeSet<String>,
    ) -> CeQueueResult<usize> {
        let now = self.clock.utc();
        let selector = WorkerSelector::NotIn(known_workers.clone());
        let reset = self
            .store
            .transaction(move |tx| -> CeQueueResult<usize> {
                Ok(tx.reset_in_progress(&selector, now)?)
            })
            .await?;
        if reset > 0 {
            info!(reset, "tasks of unknown workers returned to queue");
        }
        Ok(reset)
    }

    /// Looks up a queued task.
    ///
    /// # Errors
    ///
    /// Returns [`CeQueueError::Store`] when the store fails.
    pub async fn find(&self, task_id: TaskId) -> CeQueueResult<Option<CeTask>> {
        self.store
            .transaction(move |tx| -> CeQueueResult<Option<CeTask>> {
                let Some(task) = tx.select_task(task_id)? else {
                    return Ok(None);
                };
                Ok(Some(resolve(tx, &task)?))
            })
            .await
    }

    /// Runs a removal transaction, treating a lost conditional delete as an
    /// expected race.
    ///
    /// Returns whether the task was moved to history.
    async fn run_removal<F>(&self, work: F) -> CeQueueResult<bool>
    where
        F: FnOnce(&mut dyn QueueTransaction) -> Result<(), TxFailure> + Send + 'static,
    {
        match self.store.transaction(work).await {
            Ok(()) => Ok(true),
            Err(TxFailure::Lost(task_id)) => {
                debug!(%task_id, "queue row changed concurrently; removal rolled back");
                Ok(false)
            }
            Err(TxFailure::Queue(err)) => Err(err),
        }
    }
}

fn pause_requested(tx: &mut dyn QueueTransaction) -> QueueStoreResult<bool> {
    Ok(tx.select_property(PAUSE_PROPERTY_KEY)?.is_some())
}

fn select_queued(tx: &mut dyn QueueTransaction, task_id: TaskId) -> Result<QueuedTask, TxFailure> {
    tx.select_task(task_id)?.ok_or_else(|| {
        TxFailure::Queue(CeQueueError::IllegalState(format!(
            "Task does not exist anymore [uuid={task_id}]"
        )))
    })
}

fn remove_in(
    tx: &mut dyn QueueTransaction,
    task: &QueuedTask,
    status: ActivityStatus,
    failure: Option<TaskFailure>,
    now: DateTime<Utc>,
    node_name: Option<String>,
) -> Result<(), TxFailure> {
    let activity = Activity::from_queued(task, status, failure, now, node_name);
    tx.insert_activity(&activity)?;
    tx.delete_task_input(task.id)?;
    if tx.delete_task_if_status(task.id, task.status)? != 1 {
        return Err(TxFailure::Lost(task.id));
    }
    debug!(task_id = %task.id, %status, "task moved to history");
    Ok(())
}

/// Keeps the first submission of each entity without pending tasks, plus
/// every submission that targets no component.
fn first_per_idle_entity(
    tx: &mut dyn QueueTransaction,
    submissions: Vec<CeTaskSubmit>,
) -> QueueStoreResult<Vec<CeTaskSubmit>> {
    let entities: BTreeSet<String> = submissions
        .iter()
        .filter_map(|submission| submission.entity_uuid().map(str::to_owned))
        .collect();
    let pending: BTreeMap<String, usize> = tx.count_pending_by_entity(&entities)?;

    let mut claimed = BTreeSet::new();
    Ok(submissions
        .into_iter()
        .filter(|submission| {
            submission.entity_uuid().is_none_or(|entity| {
                !pending.contains_key(entity) && claimed.insert(entity.to_owned())
            })
        })
        .collect())
}

fn resolve(tx: &mut dyn QueueTransaction, task: &QueuedTask) -> QueueStoreResult<CeTask> {
    let component = task
        .component_uuid
        .as_deref()
        .map(|uuid| {
            tx.select_component(uuid).map(|found| {
                found.map_or_else(|| TaskComponent::unresolved(uuid), TaskComponent::resolved)
            })
        })
        .transpose()?;
    let entity = task
        .entity_uuid
        .as_deref()
        .map(|uuid| {
            tx.select_entity(uuid).map(|found| {
                found.map_or_else(|| TaskComponent::unresolved(uuid), TaskComponent::resolved)
            })
        })
        .transpose()?;
    let submitter = task
        .submitter_uuid
        .as_deref()
        .map(|uuid| {
            tx.select_user(uuid)
                .map(|found| found.map_or_else(|| Submitter::unresolved(uuid), Submitter::resolved))
        })
        .transpose()?;

    Ok(CeTask::from_parts(CeTaskParts {
        id: task.id,
        task_type: task.task_type.clone(),
        component,
        entity,
        submitter,
        characteristics: task.characteristics.clone(),
    }))
}
