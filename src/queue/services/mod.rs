//! Queue orchestration services.

mod ce_queue;

pub use ce_queue::{CeQueue, CeQueueError, CeQueueResult, PAUSE_PROPERTY_KEY};
