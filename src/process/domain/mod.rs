//! Domain model for node process supervision.
//!
//! Process identity, launch specifications, lifecycle state machines, exit
//! outcomes, and the readiness and restart policies the scheduler applies.
//! Nothing here touches the operating system.

mod command;
mod error;
mod exit;
mod ids;
mod lifecycle;
mod policy;
mod stop;

pub use command::{HealthCheck, LaunchMode, NodePlan, ProcessCommand, ProcessSpec};
pub use error::{ParseProcessIdError, ProcessDomainError};
pub use exit::{ProcessExit, RESTART_EXIT_CODE};
pub use ids::ProcessId;
pub use lifecycle::{NodeLifecycle, ProcessLifecycleState};
pub use policy::{ReadinessPolicy, RestartPolicy};
pub use stop::StopRequestKind;
