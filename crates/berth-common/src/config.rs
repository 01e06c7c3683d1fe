//! Runtime configuration model for the supervisor and its backends.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Which backend runs the service processes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Containers through the `docker` CLI.
    #[default]
    Docker,
    /// Each service's `command` as a host process.
    Process,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Process => write!(f, "process"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "process" => Ok(Self::Process),
            other => Err(format!("unknown backend \"{other}\" (expected docker or process)")),
        }
    }
}

/// Exponential restart backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first restart.
    pub initial: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Growth factor applied per consecutive restart.
    pub multiplier: u32,
    /// Uptime after which the attempt counter resets.
    pub reset_after: Duration,
}

impl BackoffConfig {
    /// Returns the delay before restart number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(constants::DEFAULT_BACKOFF_INITIAL_MS),
            max: Duration::from_millis(constants::DEFAULT_BACKOFF_MAX_MS),
            multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
            reset_after: Duration::from_millis(constants::DEFAULT_BACKOFF_RESET_MS),
        }
    }
}

/// Root configuration for a supervised run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Backend that runs the services.
    pub backend: BackendKind,
    /// Restart backoff.
    pub backoff: BackoffConfig,
    /// Grace period between a stop request and a kill.
    pub stop_grace: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            backoff: BackoffConfig::default(),
            stop_grace: Duration::from_secs(constants::DEFAULT_STOP_GRACE_SECS),
        }
    }
}
