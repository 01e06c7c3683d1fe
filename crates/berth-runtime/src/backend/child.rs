//! A service running as a local child process.

use std::time::Duration;

use async_trait::async_trait;
use berth_common::error::{BerthError, Result};
use berth_common::types::ExitStatus;
use tokio::process::Child;

use super::ServiceProcess;

/// Wraps a spawned child; shared by both backends.
#[derive(Debug)]
pub struct ChildProcess {
    service: String,
    child: Child,
}

impl ChildProcess {
    /// Wraps a spawned child of `service`.
    #[must_use]
    pub fn new(service: impl Into<String>, child: Child) -> Self {
        Self {
            service: service.into(),
            child,
        }
    }

    fn error(&self, action: &str, err: &std::io::Error) -> BerthError {
        BerthError::backend(&self.service, format!("failed to {action} process: {err}"))
    }
}

#[async_trait]
impl ServiceProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        match self.child.wait().await {
            Ok(status) => Ok(status.into()),
            Err(e) => Err(self.error("wait for", &e)),
        }
    }

    async fn stop(&mut self, grace: Duration) -> Result<ExitStatus> {
        match self.child.try_wait() {
            Ok(Some(status)) => return Ok(status.into()),
            Ok(None) => {}
            Err(e) => return Err(self.error("poll", &e)),
        }

        terminate(&self.service, self.child.id());
        if let Ok(waited) = tokio::time::timeout(grace, self.child.wait()).await {
            return waited.map(Into::into).map_err(|e| self.error("wait for", &e));
        }

        tracing::warn!(
            service = %self.service,
            grace_ms = grace.as_millis(),
            "grace period elapsed, killing process"
        );
        if let Err(e) = self.child.kill().await {
            return Err(self.error("kill", &e));
        }
        match self.child.wait().await {
            Ok(status) => Ok(status.into()),
            Err(e) => Err(self.error("reap", &e)),
        }
    }
}

/// Sends SIGTERM to the process.
#[cfg(unix)]
fn terminate(service: &str, pid: Option<u32>) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => tracing::info!(service, pid = raw, "sent SIGTERM"),
        Err(e) => tracing::debug!(service, pid = raw, error = %e, "SIGTERM failed"),
    }
}

/// No graceful signal off unix; the grace period runs out and the
/// process is killed.
#[cfg(not(unix))]
fn terminate(_service: &str, _pid: Option<u32>) {}
