//! Diesel row models for compute queue persistence.

use super::schema::{ce_activity, ce_queue, components, entities, internal_properties, users};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for queued tasks.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ce_queue)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QueueRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task type.
    pub task_type: String,
    /// Targeted component uuid.
    pub component_uuid: Option<String>,
    /// Targeted entity uuid.
    pub entity_uuid: Option<String>,
    /// Submitting user's uuid.
    pub submitter_uuid: Option<String>,
    /// Queue status.
    pub status: String,
    /// Worker holding the task.
    pub worker_uuid: Option<String>,
    /// Characteristics JSON object.
    pub characteristics: Value,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Pickup timestamp.
    pub started_at: Option<DateTime<Utc>>,
}

/// Insert model for queued tasks.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ce_queue)]
pub struct NewQueueRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task type.
    pub task_type: String,
    /// Targeted component uuid.
    pub component_uuid: Option<String>,
    /// Targeted entity uuid.
    pub entity_uuid: Option<String>,
    /// Submitting user's uuid.
    pub submitter_uuid: Option<String>,
    /// Queue status.
    pub status: String,
    /// Worker holding the task.
    pub worker_uuid: Option<String>,
    /// Characteristics JSON object.
    pub characteristics: Value,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Pickup timestamp.
    pub started_at: Option<DateTime<Utc>>,
}

/// Insert model for history rows.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ce_activity)]
pub struct NewActivityRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task type.
    pub task_type: String,
    /// Targeted component uuid.
    pub component_uuid: Option<String>,
    /// Targeted entity uuid.
    pub entity_uuid: Option<String>,
    /// Submitting user's uuid.
    pub submitter_uuid: Option<String>,
    /// Worker that held the task.
    pub worker_uuid: Option<String>,
    /// Terminal status.
    pub status: String,
    /// Error category.
    pub error_type: Option<String>,
    /// Error message.
    pub error_message: Option<String>,
    /// Execution time in milliseconds.
    pub execution_time_ms: i64,
    /// Node that recorded the activity.
    pub node_name: Option<String>,
    /// Characteristics JSON object.
    pub characteristics: Value,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Pickup timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub executed_at: DateTime<Utc>,
}

/// Insert model for internal properties.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = internal_properties)]
pub struct NewPropertyRow<'a> {
    /// Property key.
    pub name: &'a str,
    /// Property value.
    pub value: &'a str,
}

/// Query result row for component lookups.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = components)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ComponentRow {
    /// Component uuid.
    pub uuid: String,
    /// Component key.
    pub key: String,
    /// Display name.
    pub name: String,
}

/// Query result row for entity lookups.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = entities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EntityRow {
    /// Entity uuid.
    pub uuid: String,
    /// Entity key.
    pub key: String,
    /// Display name.
    pub name: String,
}

/// Query result row for user lookups.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    /// User uuid.
    pub uuid: String,
    /// Login.
    pub login: String,
}
