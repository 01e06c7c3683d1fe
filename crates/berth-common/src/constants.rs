//! System-wide constants and default paths.

use std::path::{Path, PathBuf};

/// Descriptor file names searched for, in priority order.
pub const DESCRIPTOR_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Name of the per-project state directory created next to the descriptor.
pub const PROJECT_DIR_NAME: &str = ".berth";

/// File name of the state snapshot inside the project directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Suffix of the implied shared network, `<project>_default`.
pub const DEFAULT_NETWORK_SUFFIX: &str = "default";

/// Default initial restart delay in milliseconds.
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 100;

/// Default upper bound on the restart delay in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default growth factor of the restart delay.
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Uptime in milliseconds after which the restart delay resets.
pub const DEFAULT_BACKOFF_RESET_MS: u64 = 10_000;

/// Default grace period in seconds between a stop request and a kill.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "berth";

/// Derives a project name the way compose does: the descriptor's directory
/// name, lowercased, restricted to `[a-z0-9_-]`.
#[must_use]
pub fn default_project_name(descriptor: &Path) -> String {
    let dir = descriptor
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
    let raw = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = normalize_project_name(&raw);
    if name.is_empty() {
        APP_NAME.to_string()
    } else {
        name
    }
}

/// Lowercases `raw` and drops every character outside `[a-z0-9_-]`.
#[must_use]
pub fn normalize_project_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
