//! Node configuration.
//!
//! Settings are read from a TOML file, then selected values are overridden
//! from the environment, then the whole is validated. The validated settings
//! turn into the runtime values the supervisor needs: a [`NodePlan`],
//! [`SchedulerSettings`], a [`ReadinessPolicy`], and watcher timings.
//!
//! ```toml
//! hard_stop_timeout_ms = 10000
//!
//! [node]
//! name = "node-1"
//! cluster_name = "overseer"
//! version = "1.0.0"
//! shared_dir = "/var/lib/overseer/shared"
//!
//! [scheduler]
//! restart_policy = { kind = "on_failure", max_restarts = 3 }
//!
//! [processes.search]
//! program = "/opt/search/bin/search"
//! health = { kind = "tcp", address = "127.0.0.1:9001" }
//!
//! [processes.web]
//! program = "/opt/web/bin/web"
//! depends_on = ["search"]
//! health = { kind = "http", address = "127.0.0.1:9000", path = "/api/system/status" }
//! ```

use crate::process::domain::{
    HealthCheck, NodePlan, ProcessCommand, ProcessDomainError, ProcessId, ProcessSpec,
    ReadinessPolicy, RestartPolicy,
};
use crate::process::services::SchedulerSettings;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Overrides `node.name`.
pub const NODE_NAME_ENV: &str = "OVERSEER_NODE_NAME";
/// Overrides `node.cluster_name`.
pub const CLUSTER_NAME_ENV: &str = "OVERSEER_CLUSTER_NAME";
/// Overrides `node.shared_dir`.
pub const SHARED_DIR_ENV: &str = "OVERSEER_SHARED_DIR";

/// Errors returned while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML or does not match the expected shape.
    #[error("invalid configuration syntax: {0}")]
    Parse(#[source] Box<toml::de::Error>),
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A process description was rejected.
    #[error(transparent)]
    Domain(#[from] ProcessDomainError),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Identity of the node and its filesystem footprint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    /// Node name recorded on history rows.
    pub name: String,
    /// Cluster the node belongs to.
    pub cluster_name: String,
    /// Product version registered at startup.
    pub version: String,
    /// Directory watched for stop markers.
    pub shared_dir: String,
}

/// Scheduler timings and restart behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Pause between two supervision rounds.
    pub tick_ms: u64,
    /// Grace period before a graceful stop escalates.
    pub graceful_stop_timeout_ms: u64,
    /// Restart decision applied when a process exits.
    pub restart_policy: RestartPolicy,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            graceful_stop_timeout_ms: 30_000,
            restart_policy: RestartPolicy::default(),
        }
    }
}

/// Readiness probing bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSection {
    /// Pause between two probe attempts.
    pub delay_ms: u64,
    /// Attempts per readiness check.
    pub max_attempts: u32,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            max_attempts: 50,
        }
    }
}

/// Stop marker polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherSection {
    /// Pause between two marker checks.
    pub poll_interval_ms: u64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

/// Health probe declared for a process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HealthSection {
    /// TCP connect probe.
    Tcp {
        /// `host:port` to connect to.
        address: String,
    },
    /// HTTP status probe.
    Http {
        /// `host:port` to connect to.
        address: String,
        /// Request path.
        path: String,
    },
}

/// One supervised process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessSection {
    /// Executable; required unless `external` is set.
    pub program: Option<String>,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Processes that must be operational first.
    pub depends_on: Vec<ProcessId>,
    /// Readiness probe.
    pub health: Option<HealthSection>,
    /// Supervise an externally started process through its probe only.
    pub external: bool,
}

const fn default_hard_stop_timeout_ms() -> u64 {
    10_000
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSettings {
    /// Node identity.
    pub node: NodeSection,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Readiness settings.
    #[serde(default)]
    pub readiness: ReadinessSection,
    /// Stop watcher settings.
    #[serde(default)]
    pub watchers: WatcherSection,
    /// Time a hard-stopped process gets before it is killed.
    #[serde(default = "default_hard_stop_timeout_ms")]
    pub hard_stop_timeout_ms: u64,
    /// Supervised processes keyed by process key.
    #[serde(default)]
    pub processes: BTreeMap<ProcessId, ProcessSection>,
}

impl NodeSettings {
    /// Parses settings from TOML, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the TOML is malformed or the result
    /// fails validation.
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        Self::from_toml_with_env(toml_str, |key| std::env::var(key).ok())
    }

    /// Parses settings from TOML, resolving overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the TOML is malformed or the result
    /// fails validation.
    pub fn from_toml_with_env(
        toml_str: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        let mut settings: Self =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(Box::new(err)))?;
        settings.apply_env_overrides(lookup);
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, or any
    /// error of [`Self::from_toml`].
    pub fn from_file(path: &Utf8Path) -> ConfigResult<Self> {
        let read_error = |source| ConfigError::Read {
            path: path.to_owned(),
            source,
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| ConfigError::Invalid(format!("{path} does not name a file")))?;
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
        let content = dir.read_to_string(file_name).map_err(read_error)?;
        Self::from_toml(&content)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(NODE_NAME_ENV) {
            self.node.name = value;
        }
        if let Some(value) = lookup(CLUSTER_NAME_ENV) {
            self.node.cluster_name = value;
        }
        if let Some(value) = lookup(SHARED_DIR_ENV) {
            self.node.shared_dir = value;
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("node.name", &self.node.name),
            ("node.cluster_name", &self.node.cluster_name),
            ("node.version", &self.node.version),
            ("node.shared_dir", &self.node.shared_dir),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("{field} must not be empty")));
        }
        if self.scheduler.tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tick_ms must be positive".to_owned(),
            ));
        }
        if self.watchers.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watchers.poll_interval_ms must be positive".to_owned(),
            ));
        }
        for (id, process) in &self.processes {
            if process.external && process.health.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "external process {id} needs a health probe"
                )));
            }
            if !process.external && process.program.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "process {id} needs a program"
                )));
            }
        }
        self.plan().map(|_| ())
    }

    /// Returns the shared directory.
    #[must_use]
    pub fn shared_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.node.shared_dir.trim())
    }

    /// Builds the validated process plan.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a process description is invalid or
    /// the dependencies do not form a valid plan.
    pub fn plan(&self) -> ConfigResult<NodePlan> {
        let specs = self
            .processes
            .iter()
            .map(|(id, process)| process_spec(*id, process))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(NodePlan::new(specs)?)
    }

    /// Returns the scheduler settings.
    #[must_use]
    pub const fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick: Duration::from_millis(self.scheduler.tick_ms),
            graceful_stop_timeout: Duration::from_millis(self.scheduler.graceful_stop_timeout_ms),
            restart_policy: self.scheduler.restart_policy,
        }
    }

    /// Returns the readiness policy.
    #[must_use]
    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(
            Duration::from_millis(self.readiness.delay_ms),
            self.readiness.max_attempts,
        )
    }

    /// Returns the stop marker poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watchers.poll_interval_ms)
    }

    /// Returns the time a hard-stopped process gets before it is killed.
    #[must_use]
    pub const fn hard_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_stop_timeout_ms)
    }
}

fn process_spec(id: ProcessId, process: &ProcessSection) -> ConfigResult<ProcessSpec> {
    let base = if process.external {
        ProcessSpec::external(id)
    } else {
        ProcessSpec::spawned(id, process_command(id, process)?)
    };
    let with_dependencies = base.with_dependencies(process.depends_on.iter().copied())?;
    Ok(match &process.health {
        Some(health) => with_dependencies.with_health(health_check(health)?),
        None => with_dependencies,
    })
}

fn process_command(id: ProcessId, process: &ProcessSection) -> ConfigResult<ProcessCommand> {
    let program = process
        .program
        .clone()
        .ok_or_else(|| ConfigError::Invalid(format!("process {id} needs a program")))?;
    let command = ProcessCommand::new(program)?
        .with_args(process.args.clone())
        .with_env(process.env.clone());
    Ok(match &process.working_dir {
        Some(dir) => command.with_working_dir(dir.as_str())?,
        None => command,
    })
}

fn health_check(section: &HealthSection) -> Result<HealthCheck, ProcessDomainError> {
    match section {
        HealthSection::Tcp { address } => HealthCheck::tcp(address.as_str()),
        HealthSection::Http { address, path } => HealthCheck::http(address.as_str(), path.as_str()),
    }
}
