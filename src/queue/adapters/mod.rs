//! Adapter implementations for the queue persistence port.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryQueueStore;
pub use postgres::{PostgresQueueStore, QueuePgPool};
