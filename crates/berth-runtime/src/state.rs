//! Persistent state management.
//!
//! Maintains a JSON snapshot of the supervised project so that `ps` can
//! report on a run from another process, without a daemon.

use std::path::Path;

use berth_common::error::{BerthError, Result};
use berth_common::types::{ExitStatus, ServiceState};
use serde::{Deserialize, Serialize};

/// Snapshot of one supervised run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Project name.
    pub project: String,
    /// Identifier of the supervisor run that wrote the snapshot.
    pub run_id: String,
    /// Backend that runs the services.
    pub backend: String,
    /// PID of the supervisor process.
    pub supervisor_pid: u32,
    /// ISO-8601 timestamp of the last update.
    pub updated_at: String,
    /// Per-service status, in start order.
    pub services: Vec<ServiceStatus>,
}

impl StateSnapshot {
    /// Returns the status entry of a service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Persistent record of a service's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Current lifecycle state.
    pub state: ServiceState,
    /// PID of the service process (if running).
    pub pid: Option<u32>,
    /// Number of restarts so far.
    pub restarts: u32,
    /// How the last run ended.
    pub last_exit: Option<ExitStatus>,
    /// ISO-8601 timestamp of the last transition.
    pub updated_at: String,
}

/// Loads the state snapshot from disk.
///
/// Returns `None` if no snapshot has been written yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_state(path: &Path) -> Result<Option<StateSnapshot>> {
    tracing::debug!(path = %path.display(), "loading state snapshot");
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| BerthError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Persists the state snapshot to disk atomically.
///
/// Writes to a sibling temporary file and renames it over the target.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_state(path: &Path, snapshot: &StateSnapshot) -> Result<()> {
    tracing::debug!(path = %path.display(), "saving state snapshot");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BerthError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| BerthError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| BerthError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
