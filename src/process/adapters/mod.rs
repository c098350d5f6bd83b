//! Adapter implementations for process supervision ports.

pub mod memory;

mod app_state;
mod marker;
mod monitor;
mod os;
mod probe;
mod signals;

pub use app_state::InMemoryAppState;
pub use marker::{FileStopSignals, HARD_STOP_MARKER, STOP_MARKER};
pub use monitor::ExternalProcessMonitor;
pub use os::{OsManagedProcess, OsProcessLauncher};
pub use probe::{HttpStatusProbe, TcpConnectProbe, probe_for};
pub use signals::wait_for_shutdown_signal;
