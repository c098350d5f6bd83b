//! Launch specifications for supervised processes.

use super::{ProcessDomainError, ProcessId};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Command used to spawn a native OS process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<Utf8PathBuf>,
}

impl ProcessCommand {
    /// Creates a command for `program`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::EmptyProgram`] when `program` is empty
    /// after trimming.
    pub fn new(program: impl Into<String>) -> Result<Self, ProcessDomainError> {
        let normalized = program.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ProcessDomainError::EmptyProgram);
        }

        Ok(Self {
            program: normalized,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Adds or replaces environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(values);
        self
    }

    /// Sets the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::EmptyWorkingDirectory`] when the path
    /// is empty after trimming.
    pub fn with_working_dir(
        mut self,
        value: impl Into<Utf8PathBuf>,
    ) -> Result<Self, ProcessDomainError> {
        let path = value.into();
        if path.as_str().trim().is_empty() {
            return Err(ProcessDomainError::EmptyWorkingDirectory);
        }

        self.working_dir = Some(path);
        Ok(self)
    }

    /// Returns the executable.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns extra environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the working directory, if any.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }
}

/// Readiness probe target for a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HealthCheck {
    /// Ready once a TCP connection to `address` succeeds.
    Tcp {
        /// `host:port` to connect to.
        address: String,
    },
    /// Ready once `GET path` on `address` answers `200`.
    Http {
        /// `host:port` to connect to.
        address: String,
        /// Request path, starting with `/`.
        path: String,
    },
}

impl HealthCheck {
    /// Creates a TCP connect check.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::EmptyHealthAddress`] when `address` is
    /// blank.
    pub fn tcp(address: impl Into<String>) -> Result<Self, ProcessDomainError> {
        Ok(Self::Tcp {
            address: normalize_address(&address.into())?,
        })
    }

    /// Creates an HTTP status check.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::EmptyHealthAddress`] when `address` is
    /// blank or [`ProcessDomainError::InvalidHealthPath`] when `path` does
    /// not start with `/`.
    pub fn http(
        address: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self, ProcessDomainError> {
        let normalized_path = path.into().trim().to_owned();
        if !normalized_path.starts_with('/') {
            return Err(ProcessDomainError::InvalidHealthPath(normalized_path));
        }

        Ok(Self::Http {
            address: normalize_address(&address.into())?,
            path: normalized_path,
        })
    }

    /// Returns the `host:port` the probe connects to.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::Tcp { address } | Self::Http { address, .. } => address,
        }
    }
}

fn normalize_address(address: &str) -> Result<String, ProcessDomainError> {
    let normalized = address.trim().to_owned();
    if normalized.is_empty() {
        return Err(ProcessDomainError::EmptyHealthAddress);
    }
    Ok(normalized)
}

/// How a process comes into existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "command")]
pub enum LaunchMode {
    /// Spawned and owned by the node.
    Spawn(ProcessCommand),
    /// Started elsewhere and supervised through its health probe only.
    External,
}

/// Everything the scheduler needs to know to launch one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    id: ProcessId,
    launch: LaunchMode,
    depends_on: BTreeSet<ProcessId>,
    health: Option<HealthCheck>,
}

impl ProcessSpec {
    /// Creates a spec for a process spawned from `command`.
    #[must_use]
    pub const fn spawned(id: ProcessId, command: ProcessCommand) -> Self {
        Self {
            id,
            launch: LaunchMode::Spawn(command),
            depends_on: BTreeSet::new(),
            health: None,
        }
    }

    /// Creates a spec for an externally started process.
    #[must_use]
    pub const fn external(id: ProcessId) -> Self {
        Self {
            id,
            launch: LaunchMode::External,
            depends_on: BTreeSet::new(),
            health: None,
        }
    }

    /// Declares processes that must be operational before this one starts.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError::SelfDependency`] when the process lists
    /// itself.
    pub fn with_dependencies(
        mut self,
        dependencies: impl IntoIterator<Item = ProcessId>,
    ) -> Result<Self, ProcessDomainError> {
        for dependency in dependencies {
            if dependency == self.id {
                return Err(ProcessDomainError::SelfDependency(self.id));
            }
            self.depends_on.insert(dependency);
        }
        Ok(self)
    }

    /// Adds environment variables to a spawned command.
    ///
    /// External processes are left untouched.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.launch = match self.launch {
            LaunchMode::Spawn(command) => LaunchMode::Spawn(command.with_env(values)),
            LaunchMode::External => LaunchMode::External,
        };
        self
    }

    /// Sets the readiness probe.
    #[must_use]
    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = Some(health);
        self
    }

    /// Returns the process identifier.
    #[must_use]
    pub const fn id(&self) -> ProcessId {
        self.id
    }

    /// Returns how the process is launched.
    #[must_use]
    pub const fn launch(&self) -> &LaunchMode {
        &self.launch
    }

    /// Returns startup dependencies.
    #[must_use]
    pub const fn depends_on(&self) -> &BTreeSet<ProcessId> {
        &self.depends_on
    }

    /// Returns the readiness probe, if any.
    #[must_use]
    pub const fn health(&self) -> Option<&HealthCheck> {
        self.health.as_ref()
    }
}

/// Validated set of processes supervised by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan {
    specs: BTreeMap<ProcessId, ProcessSpec>,
}

impl NodePlan {
    /// Builds a plan from individual process specs.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessDomainError`] when the plan is empty, declares a
    /// process twice, depends on an unconfigured process, or contains a
    /// dependency cycle.
    pub fn new(specs: impl IntoIterator<Item = ProcessSpec>) -> Result<Self, ProcessDomainError> {
        let mut by_id = BTreeMap::new();
        for spec in specs {
            let id = spec.id();
            if by_id.insert(id, spec).is_some() {
                return Err(ProcessDomainError::DuplicateProcess(id));
            }
        }
        if by_id.is_empty() {
            return Err(ProcessDomainError::EmptyPlan);
        }

        for spec in by_id.values() {
            if let Some(missing) = spec.depends_on().iter().find(|dep| !by_id.contains_key(dep)) {
                return Err(ProcessDomainError::UnknownDependency {
                    process: spec.id(),
                    dependency: *missing,
                });
            }
        }

        let plan = Self { specs: by_id };
        plan.ensure_acyclic()?;
        Ok(plan)
    }

    fn ensure_acyclic(&self) -> Result<(), ProcessDomainError> {
        let mut resolved = BTreeSet::new();
        loop {
            let ready: Vec<ProcessId> = self
                .specs
                .values()
                .filter(|spec| !resolved.contains(&spec.id()))
                .filter(|spec| spec.depends_on().is_subset(&resolved))
                .map(ProcessSpec::id)
                .collect();
            if ready.is_empty() {
                break;
            }
            resolved.extend(ready);
        }

        match self.specs.keys().find(|id| !resolved.contains(id)) {
            Some(stuck) => Err(ProcessDomainError::DependencyCycle(*stuck)),
            None => Ok(()),
        }
    }

    /// Returns the spec for `id`.
    #[must_use]
    pub fn get(&self, id: ProcessId) -> Option<&ProcessSpec> {
        self.specs.get(&id)
    }

    /// Iterates specs in startup order.
    pub fn specs(&self) -> impl Iterator<Item = &ProcessSpec> {
        self.specs.values()
    }

    /// Returns configured process identifiers in startup order.
    #[must_use]
    pub fn ids(&self) -> Vec<ProcessId> {
        self.specs.keys().copied().collect()
    }
}
