//! Runs one server node: launches its processes, supervises them, and stops
//! them in order when asked to.
//!
//! Usage:
//!
//! ```text
//! overseer --config <path>
//! ```
//!
//! The node stops gracefully on `SIGINT`, `SIGTERM`, or `SIGQUIT`, or when a
//! `stop` marker appears in the shared directory. A `hardstop` marker
//! terminates every process without draining.
//!
//! A bootstrap failure (unreadable configuration, unusable shared directory,
//! or a scheduler that cannot start) is logged and the binary still exits
//! with status 0, so a wrapper restarting on failure does not loop on a
//! misconfigured node.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::Parser;
use overseer::config::{ConfigError, NodeSettings};
use overseer::logging::init_logging;
use overseer::process::adapters::{
    FileStopSignals, InMemoryAppState, OsProcessLauncher, wait_for_shutdown_signal,
};
use overseer::process::domain::StopRequestKind;
use overseer::process::ports::{AppState, AppStateError, ProcessHostError, StopSignalSource};
use overseer::process::services::{ExitHook, Scheduler, SchedulerError, StopRequestWatcher};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "overseer", version, about = "Supervises the processes of a server node")]
struct Cli {
    /// Node configuration file.
    #[arg(long, env = "OVERSEER_CONFIG", default_value = "overseer.toml")]
    config: Utf8PathBuf,
}

/// Errors that abort node bootstrap.
#[derive(Debug, Error)]
enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to prepare shared directory {path}: {source}")]
    SharedDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Host(#[from] ProcessHostError),
    #[error(transparent)]
    AppState(#[from] AppStateError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();
    if let Err(err) = run(&cli.config).await {
        error!(config = %cli.config, error = %err, "node bootstrap failed");
    }
}

async fn run(config: &Utf8Path) -> Result<(), BootstrapError> {
    let settings = NodeSettings::from_file(config)?;
    let signals = Arc::new(open_shared_dir(&settings.shared_dir())?);
    signals.clear()?;

    let app_state = Arc::new(InMemoryAppState::new());
    app_state.register_cluster_name(&settings.node.cluster_name)?;
    app_state.register_version(&settings.node.version)?;

    let launcher = Arc::new(OsProcessLauncher::new(
        settings.readiness_policy(),
        settings.hard_stop_timeout(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        launcher,
        app_state,
        settings.plan()?,
        settings.scheduler_settings(),
    ));

    let source: Arc<dyn StopSignalSource> = signals;
    let stop_target = Arc::clone(&scheduler);
    let hard_stop_target = Arc::clone(&scheduler);
    let hook_target = Arc::clone(&scheduler);
    let stop_watcher = Arc::new(StopRequestWatcher::new(
        StopRequestKind::Graceful,
        Arc::clone(&source),
        stop_target,
        settings.poll_interval(),
    ));
    let hard_stop_watcher = Arc::new(StopRequestWatcher::new(
        StopRequestKind::Hard,
        source,
        hard_stop_target,
        settings.poll_interval(),
    ));

    info!(
        node = %settings.node.name,
        cluster = %settings.node.cluster_name,
        version = %settings.node.version,
        "starting node"
    );
    scheduler.schedule()?;
    stop_watcher.start_watching();
    hard_stop_watcher.start_watching();

    let hook = ExitHook::new(hook_target)
        .with_watcher(Arc::clone(&stop_watcher))
        .with_watcher(Arc::clone(&hard_stop_watcher));
    let signal_hook = tokio::spawn(async move { hook.run(wait_for_shutdown_signal()).await });

    scheduler.await_termination().await;
    stop_watcher.stop_watching();
    hard_stop_watcher.stop_watching();
    signal_hook.abort();
    info!(node = %settings.node.name, "node terminated");
    Ok(())
}

/// Creates the shared directory when missing and opens it for stop markers.
/// Markers left over from a previous run are the caller's to clear.
fn open_shared_dir(path: &Utf8Path) -> Result<FileStopSignals, BootstrapError> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|source| {
        BootstrapError::SharedDir {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(FileStopSignals::open(path)?)
}
