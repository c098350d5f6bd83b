//! `PostgreSQL` queue store.
//!
//! Each unit of work runs on a pooled connection inside
//! [`diesel::Connection::transaction`] on the blocking thread pool, so a
//! failed unit of work rolls back every statement it issued.

use super::{
    models::{ComponentRow, EntityRow, NewActivityRow, NewPropertyRow, NewQueueRow, QueueRow, UserRow},
    schema::{ce_activity, ce_queue, ce_task_input, components, entities, internal_properties, users},
};
use crate::queue::{
    domain::{
        Activity, ComponentRecord, DedupScope, QueueStatus, QueuedTask, TaskId, UserRecord,
    },
    ports::{QueueStore, QueueStoreError, QueueStoreResult, QueueTransaction, WorkerSelector},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::{BTreeMap, BTreeSet};

/// `PostgreSQL` connection pool type used by the queue store.
pub type QueuePgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed queue store.
#[derive(Debug, Clone)]
pub struct PostgresQueueStore {
    pool: QueuePgPool,
}

impl PostgresQueueStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: QueuePgPool) -> Self {
        Self { pool }
    }
}

/// Failure of a Diesel transaction: either the unit of work or Diesel
/// itself.
enum TxError<E> {
    Work(E),
    Diesel(DieselError),
}

impl<E> From<DieselError> for TxError<E> {
    fn from(err: DieselError) -> Self {
        Self::Diesel(err)
    }
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<QueueStoreError> + Send + 'static,
        F: FnOnce(&mut dyn QueueTransaction) -> Result<T, E> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(QueueStoreError::persistence)?;
            connection
                .transaction::<T, TxError<E>, _>(|tx| {
                    let mut queue_tx = PgQueueTransaction { connection: tx };
                    work(&mut queue_tx).map_err(TxError::Work)
                })
                .map_err(|err| match err {
                    TxError::Work(inner) => inner,
                    TxError::Diesel(db) => E::from(QueueStoreError::persistence(db)),
                })
        })
        .await
        .map_err(|err| E::from(QueueStoreError::persistence(err)))?
    }
}

struct PgQueueTransaction<'a> {
    connection: &'a mut PgConnection,
}

impl QueueTransaction for PgQueueTransaction<'_> {
    fn insert_task(&mut self, task: &QueuedTask) -> QueueStoreResult<()> {
        let archived = ce_activity::table
            .filter(ce_activity::id.eq(task.id.into_inner()))
            .count()
            .get_result::<i64>(self.connection)
            .map_err(QueueStoreError::persistence)?;
        if archived > 0 {
            return Err(QueueStoreError::DuplicateTask(task.id));
        }

        let row = to_new_queue_row(task)?;
        diesel::insert_into(ce_queue::table)
            .values(&row)
            .execute(self.connection)
            .map_err(|err| map_insert_error(err, task.id))?;
        Ok(())
    }

    fn select_task(&mut self, id: TaskId) -> QueueStoreResult<Option<QueuedTask>> {
        let row = ce_queue::table
            .filter(ce_queue::id.eq(id.into_inner()))
            .select(QueueRow::as_select())
            .first::<QueueRow>(self.connection)
            .optional()
            .map_err(QueueStoreError::persistence)?;
        row.map(row_to_queued_task).transpose()
    }

    fn select_all_in_asc_order(&mut self) -> QueueStoreResult<Vec<QueuedTask>> {
        let rows = ce_queue::table
            .order((ce_queue::created_at.asc(), ce_queue::id.asc()))
            .select(QueueRow::as_select())
            .load::<QueueRow>(self.connection)
            .map_err(QueueStoreError::persistence)?;
        rows.into_iter().map(row_to_queued_task).collect()
    }

    fn count_pending(&mut self, scope: &DedupScope) -> QueueStoreResult<usize> {
        if scope.is_empty() {
            return Ok(0);
        }
        let mut query = ce_queue::table
            .filter(ce_queue::status.eq(QueueStatus::Pending.as_str()))
            .into_boxed();
        if let Some(entity_uuid) = scope.entity_uuid() {
            query = query.filter(ce_queue::entity_uuid.eq(entity_uuid));
        }
        if let Some(task_type) = scope.task_type() {
            query = query.filter(ce_queue::task_type.eq(task_type));
        }
        let count = query
            .count()
            .get_result::<i64>(self.connection)
            .map_err(QueueStoreError::persistence)?;
        to_count(count)
    }

    fn count_pending_by_entity(
        &mut self,
        entity_uuids: &BTreeSet<String>,
    ) -> QueueStoreResult<BTreeMap<String, usize>> {
        if entity_uuids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let wanted: Vec<&str> = entity_uuids.iter().map(String::as_str).collect();
        let rows = ce_queue::table
            .filter(ce_queue::status.eq(QueueStatus::Pending.as_str()))
            .filter(ce_queue::entity_uuid.eq_any(wanted))
            .group_by(ce_queue::entity_uuid)
            .select((ce_queue::entity_uuid, diesel::dsl::count_star()))
            .load::<(Option<String>, i64)>(self.connection)
            .map_err(QueueStoreError::persistence)?;

        rows.into_iter()
            .filter_map(|(entity, count)| entity.map(|uuid| (uuid, count)))
            .map(|(uuid, count)| to_count(count).map(|value| (uuid, value)))
            .collect()
    }

    fn count_in_progress(&mut self) -> QueueStoreResult<usize> {
        let count = ce_queue::table
            .filter(ce_queue::status.eq(QueueStatus::InProgress.as_str()))
            .count()
            .get_result::<i64>(self.connection)
            .map_err(QueueStoreError::persistence)?;
        to_count(count)
    }

    fn select_oldest_pending(&mut self) -> QueueStoreResult<Option<QueuedTask>> {
        let row = ce_queue::table
            .filter(ce_queue::status.eq(QueueStatus::Pending.as_str()))
            .order((ce_queue::created_at.asc(), ce_queue::id.asc()))
            .select(QueueRow::as_select())
            .first::<QueueRow>(self.connection)
            .optional()
            .map_err(QueueStoreError::persistence)?;
        row.map(row_to_queued_task).transpose()
    }

    fn start_task_if_pending(
        &mut self,
        id: TaskId,
        worker_uuid: &str,
        now: DateTime<Utc>,
    ) -> QueueStoreResult<usize> {
        diesel::update(
            ce_queue::table
                .filter(ce_queue::id.eq(id.into_inner()))
                .filter(ce_queue::status.eq(QueueStatus::Pending.as_str())),
        )
        .set((
            ce_queue::status.eq(QueueStatus::InProgress.as_str()),
            ce_queue::worker_uuid.eq(Some(worker_uuid)),
            ce_queue::started_at.eq(Some(now)),
            ce_queue::updated_at.eq(now),
        ))
        .execute(self.connection)
        .map_err(QueueStoreError::persistence)
    }

    fn reset_in_progress(
        &mut self,
        selector: &WorkerSelector,
        now: DateTime<Utc>,
    ) -> QueueStoreResult<usize> {
        let in_progress = ce_queue::status.eq(QueueStatus::InProgress.as_str());
        let changes = (
            ce_queue::status.eq(QueueStatus::Pending.as_str()),
            ce_queue::worker_uuid.eq(None::<String>),
            ce_queue::started_at.eq(None::<DateTime<Utc>>),
            ce_queue::updated_at.eq(now),
        );
        let updated = match selector {
            WorkerSelector::Only(worker_uuid) => diesel::update(
                ce_queue::table
                    .filter(in_progress)
                    .filter(ce_queue::worker_uuid.eq(worker_uuid.as_str())),
            )
            .set(changes)
            .execute(self.connection),
            WorkerSelector::NotIn(known) => {
                let known_workers: Vec<&str> = known.iter().map(String::as_str).collect();
                diesel::update(
                    ce_queue::table.filter(in_progress).filter(
                        ce_queue::worker_uuid
                            .is_null()
                            .or(ce_queue::worker_uuid.ne_all(known_workers)),
                    ),
                )
                .set(changes)
                .execute(self.connection)
            }
        };
        updated.map_err(QueueStoreError::persistence)
    }

    fn insert_activity(&mut self, activity: &Activity) -> QueueStoreResult<()> {
        let row = to_new_activity_row(activity)?;
        diesel::insert_into(ce_activity::table)
            .values(&row)
            .execute(self.connection)
            .map_err(|err| map_insert_error(err, activity.id))?;
        Ok(())
    }

    fn delete_task_input(&mut self, id: TaskId) -> QueueStoreResult<()> {
        diesel::delete(ce_task_input::table.filter(ce_task_input::task_id.eq(id.into_inner())))
            .execute(self.connection)
            .map_err(QueueStoreError::persistence)?;
        Ok(())
    }

    fn delete_task_if_status(
        &mut self,
        id: TaskId,
        status: QueueStatus,
    ) -> QueueStoreResult<usize> {
        diesel::delete(
            ce_queue::table
                .filter(ce_queue::id.eq(id.into_inner()))
                .filter(ce_queue::status.eq(status.as_str())),
        )
        .execute(self.connection)
        .map_err(QueueStoreError::persistence)
    }

    fn select_property(&mut self, key: &str) -> QueueStoreResult<Option<String>> {
        internal_properties::table
            .filter(internal_properties::name.eq(key))
            .select(internal_properties::value)
            .first::<String>(self.connection)
            .optional()
            .map_err(QueueStoreError::persistence)
    }

    fn upsert_property(&mut self, key: &str, value: &str) -> QueueStoreResult<()> {
        diesel::insert_into(internal_properties::table)
            .values(&NewPropertyRow { name: key, value })
            .on_conflict(internal_properties::name)
            .do_update()
            .set(internal_properties::value.eq(value))
            .execute(self.connection)
            .map_err(QueueStoreError::persistence)?;
        Ok(())
    }

    fn delete_property(&mut self, key: &str) -> QueueStoreResult<()> {
        diesel::delete(internal_properties::table.filter(internal_properties::name.eq(key)))
            .execute(self.connection)
            .map_err(QueueStoreError::persistence)?;
        Ok(())
    }

    fn select_component(&mut self, uuid: &str) -> QueueStoreResult<Option<ComponentRecord>> {
        let row = components::table
            .filter(components::uuid.eq(uuid))
            .select(ComponentRow::as_select())
            .first::<ComponentRow>(self.connection)
            .optional()
            .map_err(QueueStoreError::persistence)?;
        Ok(row.map(|found| ComponentRecord {
            uuid: found.uuid,
            key: found.key,
            name: found.name,
        }))
    }

    fn select_entity(&mut self, uuid: &str) -> QueueStoreResult<Option<ComponentRecord>> {
        let row = entities::table
            .filter(entities::uuid.eq(uuid))
            .select(EntityRow::as_select())
            .first::<EntityRow>(self.connection)
            .optional()
            .map_err(QueueStoreError::persistence)?;
        Ok(row.map(|found| ComponentRecord {
            uuid: found.uuid,
            key: found.key,
            name: found.name,
        }))
    }

    fn select_user(&mut self, uuid: &str) -> QueueStoreResult<Option<UserRecord>> {
        let row = users::table
            .filter(users::uuid.eq(uuid))
            .select(UserRow::as_select())
            .first::<UserRow>(self.connection)
            .optional()
            .map_err(QueueStoreError::persistence)?;
        Ok(row.map(|found| UserRecord {
            uuid: found.uuid,
            login: found.login,
        }))
    }
}

fn map_insert_error(err: DieselError, id: TaskId) -> QueueStoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            QueueStoreError::DuplicateTask(id)
        }
        _ => QueueStoreError::persistence(err),
    }
}

fn to_count(count: i64) -> QueueStoreResult<usize> {
    usize::try_from(count).map_err(QueueStoreError::persistence)
}

fn to_new_queue_row(task: &QueuedTask) -> QueueStoreResult<NewQueueRow> {
    let characteristics =
        serde_json::to_value(&task.characteristics).map_err(QueueStoreError::persistence)?;
    Ok(NewQueueRow {
        id: task.id.into_inner(),
        task_type: task.task_type.clone(),
        component_uuid: task.component_uuid.clone(),
        entity_uuid: task.entity_uuid.clone(),
        submitter_uuid: task.submitter_uuid.clone(),
        status: task.status.as_str().to_owned(),
        worker_uuid: task.worker_uuid.clone(),
        characteristics,
        created_at: task.created_at,
        updated_at: task.updated_at,
        started_at: task.started_at,
    })
}

fn row_to_queued_task(row: QueueRow) -> QueueStoreResult<QueuedTask> {
    let QueueRow {
        id,
        task_type,
        component_uuid,
        entity_uuid,
        submitter_uuid,
        status: persisted_status,
        worker_uuid,
        characteristics: persisted_characteristics,
        created_at,
        updated_at,
        started_at,
    } = row;

    let status =
        QueueStatus::try_from(persisted_status.as_str()).map_err(QueueStoreError::persistence)?;
    let characteristics =
        serde_json::from_value::<BTreeMap<String, String>>(persisted_characteristics)
            .map_err(QueueStoreError::persistence)?;

    Ok(QueuedTask {
        id: TaskId::from_uuid(id),
        task_type,
        component_uuid,
        entity_uuid,
        submitter_uuid,
        status,
        worker_uuid,
        characteristics,
        created_at,
        updated_at,
        started_at,
    })
}

fn to_new_activity_row(activity: &Activity) -> QueueStoreResult<NewActivityRow> {
    let characteristics =
        serde_json::to_value(&activity.characteristics).map_err(QueueStoreError::persistence)?;
    Ok(NewActivityRow {
        id: activity.id.into_inner(),
        task_type: activity.task_type.clone(),
        component_uuid: activity.component_uuid.clone(),
        entity_uuid: activity.entity_uuid.clone(),
        submitter_uuid: activity.submitter_uuid.clone(),
        worker_uuid: activity.worker_uuid.clone(),
        status: activity.status.as_str().to_owned(),
        error_type: activity.error_type.clone(),
        error_message: activity.error_message.clone(),
        execution_time_ms: activity.execution_time_ms,
        node_name: activity.node_name.clone(),
        characteristics,
        submitted_at: activity.submitted_at,
        started_at: activity.started_at,
        executed_at: activity.executed_at,
    })
}
