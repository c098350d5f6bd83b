//! Port contracts for queue persistence.

mod store;

pub use store::{QueueStore, QueueStoreError, QueueStoreResult, QueueTransaction, WorkerSelector};
