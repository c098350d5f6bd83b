//! Domain model for the compute task queue.
//!
//! Submissions, queue rows, history rows, and the pause state shared by
//! compute workers.

mod activity;
mod error;
mod ids;
mod pause;
mod submit;
mod task;

pub use activity::{Activity, ActivityStatus, TaskFailure};
pub use error::{ParseActivityStatusError, ParseQueueStatusError, QueueDomainError};
pub use ids::TaskId;
pub use pause::WorkersPauseStatus;
pub use submit::{CeTaskSubmit, DedupScope, SubmitComponent, SubmitOption, TaskSubmitBuilder};
pub use task::{
    CeTask, CeTaskParts, ComponentRecord, QueueStatus, QueuedTask, Submitter, TaskComponent,
    UserRecord,
};
