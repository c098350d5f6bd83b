//! `PostgreSQL` adapter for the compute queue.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresQueueStore, QueuePgPool};
