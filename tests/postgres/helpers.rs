//! Shared test helpers for `PostgreSQL` integration tests.

pub use super::cluster::{BoxError, PostgresCluster, postgres_cluster};
use super::cluster::{ManagedCluster, TemporaryDatabase};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::{BigInt, Nullable, Text};
use mockable::DefaultClock;
use overseer::queue::adapters::PostgresQueueStore;
use overseer::queue::domain::{CeTaskSubmit, SubmitComponent, TaskId};
use overseer::queue::services::CeQueue;
use rstest::fixture;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

/// SQL creating the queue schema.
pub const CREATE_QUEUE_SQL: &str =
    include_str!("../../migrations/2026-10-18-000000_create_ce_queue/up.sql");

/// Template database name for the pre-migrated schema.
pub const TEMPLATE_DB: &str = "overseer_test_template";

/// Node name recorded on history rows written by the tests.
pub const NODE_NAME: &str = "node-pg";

/// Queue service type used by the `PostgreSQL` tests.
pub type PgQueue = CeQueue<PostgresQueueStore, DefaultClock>;

/// Builds a multi-threaded runtime for driving async store calls.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built.
pub fn test_runtime() -> Result<Runtime, BoxError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| Box::new(err) as BoxError)
}

/// Ensures the template database exists with the schema applied.
///
/// # Errors
///
/// Returns an error if template creation or migration fails.
pub fn ensure_template(cluster: &ManagedCluster) -> Result<(), BoxError> {
    cluster.ensure_template_exists(TEMPLATE_DB, |url| {
        let mut conn = PgConnection::establish(url).map_err(|err| Box::new(err) as BoxError)?;
        conn.batch_execute(CREATE_QUEUE_SQL)
            .map_err(|err| Box::new(err) as BoxError)
    })
}

/// Queue service over a freshly migrated database of its own.
///
/// Fields drop in declaration order, so the pool closes before the database
/// is dropped.
pub struct QueueDb {
    pub queue: PgQueue,
    pub store: Arc<PostgresQueueStore>,
    pub runtime: Runtime,
    pub db: TemporaryDatabase,
}

impl QueueDb {
    /// Creates a database from the template and wires a queue to it.
    ///
    /// # Errors
    ///
    /// Returns an error if template setup, database creation or pool
    /// construction fails.
    pub fn create(cluster: PostgresCluster) -> Result<Self, BoxError> {
        ensure_template(cluster)?;
        let db = cluster
            .temporary_database_from_template(&format!("test_{}", Uuid::new_v4().simple()), TEMPLATE_DB)?;
        let pool = Pool::builder()
            .max_size(2)
            .build(ConnectionManager::<PgConnection>::new(db.url()))
            .map_err(|err| Box::new(err) as BoxError)?;
        let store = Arc::new(PostgresQueueStore::new(pool));
        let queue = CeQueue::new(Arc::clone(&store), Arc::new(DefaultClock)).with_node_name(NODE_NAME);
        Ok(Self {
            queue,
            store,
            runtime: test_runtime()?,
            db,
        })
    }

    /// Opens a connection outside the store's pool.
    pub fn connect(&self) -> PgConnection {
        PgConnection::establish(&self.db.url()).expect("direct connection")
    }

    /// Builds a submission of `task_type` targeting entity `entity`.
    pub fn submission(&self, task_type: &str, entity: &str) -> CeTaskSubmit {
        self.queue
            .prepare_submit()
            .set_type(task_type)
            .set_component(SubmitComponent::entity(entity).expect("valid entity uuid"))
            .build()
            .expect("valid submission")
    }

    /// Counts the rows of `table` matching `filter`.
    pub fn count(&self, table: &str, filter: &str) -> i64 {
        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = BigInt)]
            count: i64,
        }

        diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {table} WHERE {filter}"))
            .get_result::<CountRow>(&mut self.connect())
            .expect("count query")
            .count
    }

    /// Reads the history row of `id`.
    pub fn activity(&self, id: TaskId) -> ActivityRow {
        diesel::sql_query(
            "SELECT status, worker_uuid, node_name, error_type, error_message \
             FROM ce_activity WHERE id = $1",
        )
        .bind::<diesel::sql_types::Uuid, _>(id.into_inner())
        .get_result::<ActivityRow>(&mut self.connect())
        .expect("activity row")
    }

    /// Reads the queue status of `id`.
    pub fn queue_status(&self, id: TaskId) -> String {
        #[derive(QueryableByName)]
        struct StatusRow {
            #[diesel(sql_type = Text)]
            status: String,
        }

        diesel::sql_query("SELECT status FROM ce_queue WHERE id = $1")
            .bind::<diesel::sql_types::Uuid, _>(id.into_inner())
            .get_result::<StatusRow>(&mut self.connect())
            .expect("queue row")
            .status
    }
}

/// History columns checked by the tests.
#[derive(Debug, QueryableByName)]
pub struct ActivityRow {
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub worker_uuid: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub node_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_type: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_message: Option<String>,
}

/// Provides a queue over its own database, or `None` without a cluster.
#[fixture]
pub fn queue_db(postgres_cluster: Option<PostgresCluster>) -> Option<QueueDb> {
    postgres_cluster.map(|cluster| QueueDb::create(cluster).expect("queue database setup"))
}
