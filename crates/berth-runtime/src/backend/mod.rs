//! Service backend abstraction.
//!
//! The supervisor never runs processes itself: it asks a backend to prepare
//! the project's shared resources, start one service at a time, and tear the
//! project down again. Each started service is handed back as a
//! [`ServiceProcess`] the supervisor can wait on or stop.

pub mod child;
pub mod docker;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use berth_common::config::BackendKind;
use berth_common::error::Result;
use berth_common::types::ExitStatus;
use berth_compose::model::{Descriptor, Service};

use crate::project::Project;

/// Runs the services of a project.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Short backend name recorded in the state snapshot.
    fn name(&self) -> &'static str;

    /// Creates the shared network and every declared volume.
    ///
    /// Called once, before any service starts. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource cannot be created or an external
    /// volume does not exist.
    async fn prepare(&self, project: &Project, descriptor: &Descriptor) -> Result<()>;

    /// Starts one service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service process cannot be launched. The
    /// supervisor treats this as a failed exit.
    async fn start(
        &self,
        project: &Project,
        descriptor: &Descriptor,
        service: &Service,
    ) -> Result<Box<dyn ServiceProcess>>;

    /// Removes the project's resources, and its volumes if asked to.
    ///
    /// External volumes are never removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource cannot be removed.
    async fn teardown(
        &self,
        project: &Project,
        descriptor: &Descriptor,
        remove_volumes: bool,
    ) -> Result<()>;
}

/// A started service.
#[async_trait]
pub trait ServiceProcess: Send {
    /// PID of the local process, if there is one.
    fn pid(&self) -> Option<u32>;

    /// Waits for the process to exit. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the exit status cannot be collected.
    async fn wait(&mut self) -> Result<ExitStatus>;

    /// Asks the process to stop, killing it after `grace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be signaled or reaped.
    async fn stop(&mut self, grace: Duration) -> Result<ExitStatus>;
}

/// Creates the backend of the given kind.
///
/// # Errors
///
/// Returns an error if the backend is not usable on this host, e.g. the
/// `docker` binary is not on `PATH`.
pub fn create_backend(kind: BackendKind) -> Result<Arc<dyn ServiceBackend>> {
    tracing::debug!(%kind, "creating backend");
    match kind {
        BackendKind::Docker => Ok(Arc::new(docker::DockerBackend::locate()?)),
        BackendKind::Process => Ok(Arc::new(process::ProcessBackend::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_backend_is_always_available() {
        let backend = create_backend(BackendKind::Process).expect("process backend");
        assert_eq!(backend.name(), "process");
    }
}
