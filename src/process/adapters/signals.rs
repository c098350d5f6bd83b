//! Operating-system termination signals.

use std::io;

/// Waits until the node receives a termination signal.
///
/// On Unix this is `SIGINT`, `SIGTERM`, or `SIGQUIT`; elsewhere it is
/// Ctrl-C.
///
/// # Errors
///
/// Returns the underlying I/O error when a signal handler cannot be
/// installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

/// Waits until the node receives a termination signal.
///
/// # Errors
///
/// Returns the underlying I/O error when the Ctrl-C handler cannot be
/// installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
