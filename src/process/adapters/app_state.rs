//! In-process implementation of the shared node state.

use crate::process::{
    domain::ProcessId,
    ports::{AppState, AppStateError, AppStateResult},
};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory app state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAppState {
    state: Arc<RwLock<AppStateData>>,
}

#[derive(Debug, Default)]
struct AppStateData {
    operational: HashSet<ProcessId>,
    web_leader_locked: bool,
    cluster_name: Option<String>,
    version: Option<String>,
}

impl InMemoryAppState {
    /// Creates an empty app state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppStateResult<std::sync::RwLockReadGuard<'_, AppStateData>> {
        self.state
            .read()
            .map_err(|err| AppStateError::storage(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> AppStateResult<std::sync::RwLockWriteGuard<'_, AppStateData>> {
        self.state
            .write()
            .map_err(|err| AppStateError::storage(std::io::Error::other(err.to_string())))
    }
}

impl AppState for InMemoryAppState {
    fn is_operational(&self, process: ProcessId) -> AppStateResult<bool> {
        Ok(self.read()?.operational.contains(&process))
    }

    fn set_operational(&self, process: ProcessId) -> AppStateResult<()> {
        self.write()?.operational.insert(process);
        Ok(())
    }

    fn clear_operational(&self, process: ProcessId) -> AppStateResult<()> {
        self.write()?.operational.remove(&process);
        Ok(())
    }

    fn try_to_lock_web_leader(&self) -> AppStateResult<bool> {
        let mut state = self.write()?;
        if state.web_leader_locked {
            return Ok(false);
        }
        state.web_leader_locked = true;
        Ok(true)
    }

    fn register_cluster_name(&self, name: &str) -> AppStateResult<()> {
        let mut state = self.write()?;
        match state.cluster_name.as_deref() {
            Some(registered) if registered != name => Err(AppStateError::ConflictingClusterName {
                registered: registered.to_owned(),
                requested: name.to_owned(),
            }),
            Some(_) => Ok(()),
            None => {
                state.cluster_name = Some(name.to_owned());
                Ok(())
            }
        }
    }

    fn register_version(&self, version: &str) -> AppStateResult<()> {
        let mut state = self.write()?;
        match state.version.as_deref() {
            Some(registered) if registered != version => Err(AppStateError::ConflictingVersion {
                registered: registered.to_owned(),
                requested: version.to_owned(),
            }),
            Some(_) => Ok(()),
            None => {
                state.version = Some(version.to_owned());
                Ok(())
            }
        }
    }

    fn cluster_name(&self) -> AppStateResult<Option<String>> {
        Ok(self.read()?.cluster_name.clone())
    }

    fn version(&self) -> AppStateResult<Option<String>> {
        Ok(self.read()?.version.clone())
    }

    fn reset(&self) -> AppStateResult<()> {
        let mut state = self.write()?;
        state.operational.clear();
        state.web_leader_locked = false;
        Ok(())
    }
}
