//! Port contracts for process supervision.

mod app_state;
mod launcher;
mod managed;
mod probe;
mod stop_signal;

pub use app_state::{AppState, AppStateError, AppStateResult};
pub use launcher::ProcessLauncher;
pub use managed::{ManagedProcess, ProcessHostError, ProcessHostResult};
#[cfg(test)]
pub use probe::MockHealthProbe;
pub use probe::{HealthProbe, ProbeError};
pub use stop_signal::{ShutdownTarget, StopSignalSource};
