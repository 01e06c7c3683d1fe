//! Domain primitive types used across the berth workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rule governing automatic restart after a service process exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RestartPolicy {
    /// Restart unconditionally, with backoff.
    Always,
    /// Restart only after a non-zero exit, at most `max_retries` times if set.
    OnFailure {
        /// Upper bound on restarts, `None` for unbounded.
        max_retries: Option<u32>,
    },
    /// Leave the service stopped.
    #[default]
    Never,
}

impl RestartPolicy {
    /// Decides whether a service that exited with `exit` gets restarted,
    /// given how many times it has already been restarted.
    #[must_use]
    pub fn should_restart(self, exit: ExitStatus, restarts: u32) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::OnFailure { max_retries } => {
                !exit.success() && max_retries.is_none_or(|max| restarts < max)
            }
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::OnFailure { max_retries: None } => write!(f, "on-failure"),
            Self::OnFailure {
                max_retries: Some(n),
            } => write!(f, "on-failure:{n}"),
            Self::Never => write!(f, "no"),
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    /// Accepts the compose spellings: `always`, `unless-stopped`,
    /// `on-failure`, `on-failure:N`, `no` and `never`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "always" | "unless-stopped" => Ok(Self::Always),
            "no" | "never" => Ok(Self::Never),
            "on-failure" => Ok(Self::OnFailure { max_retries: None }),
            other => {
                let Some(count) = other.strip_prefix("on-failure:") else {
                    return Err(format!(
                        "unknown restart policy \"{other}\" (expected always, on-failure[:N] or no)"
                    ));
                };
                count
                    .trim()
                    .parse::<u32>()
                    .map(|n| Self::OnFailure {
                        max_retries: Some(n),
                    })
                    .map_err(|_| format!("invalid on-failure retry count \"{count}\""))
            }
        }
    }
}

impl From<RestartPolicy> for String {
    fn from(policy: RestartPolicy) -> Self {
        policy.to_string()
    }
}

impl TryFrom<String> for RestartPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How a service process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code, `None` when killed by a signal or never started.
    pub code: Option<i32>,
}

impl ExitStatus {
    /// An exit with the given code.
    #[must_use]
    pub const fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// An exit without a code (signal, or the process never started).
    #[must_use]
    pub const fn unknown() -> Self {
        Self { code: None }
    }

    /// Returns whether the process exited with code zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "no exit code"),
        }
    }
}

/// Lifecycle state of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Waiting for its dependencies to start.
    Pending,
    /// The backend is launching it.
    Starting,
    /// Its process is running.
    Running,
    /// It exited and a restart is scheduled.
    Restarting,
    /// It exited and its policy leaves it down.
    Exited,
    /// It was stopped by a shutdown.
    Stopped,
}

impl ServiceState {
    /// Returns whether no further transitions will happen without a new run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Stopped)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Restarting => write!(f, "restarting"),
            Self::Exited => write!(f, "exited"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
