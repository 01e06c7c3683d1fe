//! Naming and on-disk layout of a supervised project.

use std::path::{Path, PathBuf};

use berth_common::constants;
use berth_compose::model::{Volume, VolumeBacking};

/// One descriptor instance under supervision.
///
/// The project name prefixes every backend resource, so two checkouts of
/// the same descriptor can run side by side under different names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Normalized project name.
    pub name: String,
    /// Directory relative paths in the descriptor are resolved against.
    pub working_dir: PathBuf,
    /// Project-local state directory (`<working_dir>/.berth`).
    pub state_dir: PathBuf,
}

impl Project {
    /// Creates a project rooted at `working_dir`.
    #[must_use]
    pub fn new(name: &str, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let state_dir = working_dir.join(constants::PROJECT_DIR_NAME);
        Self {
            name: constants::normalize_project_name(name),
            working_dir,
            state_dir,
        }
    }

    /// Creates the project of a descriptor file.
    ///
    /// The name is `explicit` if given, then `declared` (the descriptor's
    /// top-level `name`), then the descriptor directory name.
    #[must_use]
    pub fn for_descriptor(path: &Path, explicit: Option<&str>, declared: Option<&str>) -> Self {
        let working_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let name = explicit
            .or(declared)
            .map_or_else(|| constants::default_project_name(path), str::to_string);
        Self::new(&name, working_dir)
    }

    /// Name of the shared network every service joins.
    #[must_use]
    pub fn network_name(&self) -> String {
        format!("{}_{}", self.name, constants::DEFAULT_NETWORK_SUFFIX)
    }

    /// Backend name of a declared volume.
    #[must_use]
    pub fn volume_name(&self, volume: &Volume) -> String {
        match &volume.backing {
            VolumeBacking::External { name } => name.clone().unwrap_or_else(|| volume.name.clone()),
            VolumeBacking::Named { .. } => format!("{}_{}", self.name, volume.name),
        }
    }

    /// Backend name of a service's container.
    #[must_use]
    pub fn container_name(&self, service: &str) -> String {
        format!("{}-{service}-1", self.name)
    }

    /// Path of the state snapshot.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(constants::STATE_FILE_NAME)
    }

    /// Directory holding per-service log files.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Resolves a descriptor path (mount source, env file) against the
    /// working directory. `~` expands to `$HOME`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}
