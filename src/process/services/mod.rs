//! Application services for process supervision.

mod hook;
mod readiness;
mod scheduler;
mod watcher;

pub use hook::ExitHook;
pub use readiness::ReadinessChecker;
pub use scheduler::{
    Scheduler, SchedulerError, SchedulerResult, SchedulerSettings, WEB_LEADER_ENV,
};
pub use watcher::StopRequestWatcher;
