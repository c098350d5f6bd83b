//! Diesel schema for compute queue persistence.

diesel::table! {
    /// Tasks waiting for or held by a compute worker.
    ce_queue (id) {
        /// Task identifier.
        id -> Uuid,
        /// Task type.
        #[max_length = 40]
        task_type -> Varchar,
        /// Targeted component uuid.
        #[max_length = 40]
        component_uuid -> Nullable<Varchar>,
        /// Targeted entity uuid.
        #[max_length = 40]
        entity_uuid -> Nullable<Varchar>,
        /// Submitting user's uuid.
        #[max_length = 255]
        submitter_uuid -> Nullable<Varchar>,
        /// Queue status.
        #[max_length = 15]
        status -> Varchar,
        /// Worker holding the task.
        #[max_length = 40]
        worker_uuid -> Nullable<Varchar>,
        /// Task characteristics.
        characteristics -> Jsonb,
        /// Submission timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Pickup timestamp.
        started_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Tasks that left the queue.
    ce_activity (id) {
        /// Task identifier.
        id -> Uuid,
        /// Task type.
        #[max_length = 40]
        task_type -> Varchar,
        /// Targeted component uuid.
        #[max_length = 40]
        component_uuid -> Nullable<Varchar>,
        /// Targeted entity uuid.
        #[max_length = 40]
        entity_uuid -> Nullable<Varchar>,
        /// Submitting user's uuid.
        #[max_length = 255]
        submitter_uuid -> Nullable<Varchar>,
        /// Worker that held the task.
        #[max_length = 40]
        worker_uuid -> Nullable<Varchar>,
        /// Terminal status.
        #[max_length = 15]
        status -> Varchar,
        /// Error category.
        #[max_length = 255]
        error_type -> Nullable<Varchar>,
        /// Error message.
        error_message -> Nullable<Text>,
        /// Execution time in milliseconds.
        execution_time_ms -> Int8,
        /// Node that recorded the activity.
        #[max_length = 100]
        node_name -> Nullable<Varchar>,
        /// Task characteristics.
        characteristics -> Jsonb,
        /// Submission timestamp.
        submitted_at -> Timestamptz,
        /// Pickup timestamp.
        started_at -> Nullable<Timestamptz>,
        /// Completion timestamp.
        executed_at -> Timestamptz,
    }
}

diesel::table! {
    /// Input blobs attached to queued tasks.
    ce_task_input (task_id) {
        /// Owning task identifier.
        task_id -> Uuid,
        /// Raw input.
        input_data -> Bytea,
    }
}

diesel::table! {
    /// Node-wide key/value properties.
    internal_properties (name) {
        /// Property key.
        #[max_length = 100]
        name -> Varchar,
        /// Property value.
        value -> Text,
    }
}

diesel::table! {
    /// Components known to the platform.
    components (uuid) {
        /// Component uuid.
        #[max_length = 40]
        uuid -> Varchar,
        /// Component key.
        #[max_length = 400]
        key -> Varchar,
        /// Display name.
        #[max_length = 2000]
        name -> Varchar,
    }
}

diesel::table! {
    /// Analysis entities (projects, branches, portfolios).
    entities (uuid) {
        /// Entity uuid.
        #[max_length = 40]
        uuid -> Varchar,
        /// Entity key.
        #[max_length = 400]
        key -> Varchar,
        /// Display name.
        #[max_length = 2000]
        name -> Varchar,
    }
}

diesel::table! {
    /// Platform users.
    users (uuid) {
        /// User uuid.
        #[max_length = 255]
        uuid -> Varchar,
        /// Login.
        #[max_length = 255]
        login -> Varchar,
    }
}
