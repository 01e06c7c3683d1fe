//! Runtime engine: descriptor file to supervised project.
//!
//! Ties the loader, the project layout, a backend and the supervisor
//! together behind the operations the CLI exposes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use berth_common::config::RuntimeConfig;
use berth_common::error::{BerthError, Result};
use berth_compose::Plan;

use crate::backend::{self, ServiceBackend};
use crate::logs;
use crate::project::Project;
use crate::state::{self, StateSnapshot};
use crate::supervisor::{Supervisor, SupervisorReport};

/// The runtime engine for one descriptor.
#[derive(Debug)]
pub struct Engine {
    descriptor_path: PathBuf,
    plan: Arc<Plan>,
    project: Project,
    config: RuntimeConfig,
}

impl Engine {
    /// Loads and plans a descriptor file.
    ///
    /// `project_name` overrides the descriptor's `name` and the directory
    /// name.
    ///
    /// # Errors
    ///
    /// Returns the descriptor's I/O, parse, reference or cycle error.
    pub fn open(path: &Path, project_name: Option<&str>, config: RuntimeConfig) -> Result<Self> {
        let plan = berth_compose::load_file(path)?;
        let project =
            Project::for_descriptor(path, project_name, plan.descriptor().name.as_deref());
        tracing::info!(
            project = %project.name,
            state_dir = %project.state_dir.display(),
            services = plan.order().len(),
            "project loaded"
        );
        Ok(Self {
            descriptor_path: path.to_path_buf(),
            plan: Arc::new(plan),
            project,
            config,
        })
    }

    /// Path of the loaded descriptor.
    #[must_use]
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// The resolved plan.
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The project being supervised.
    #[must_use]
    pub const fn project(&self) -> &Project {
        &self.project
    }

    /// The runtime configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Supervises the project on the configured backend until every
    /// service is terminal or `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or cannot prepare
    /// the project.
    pub async fn up<F>(&self, shutdown: F) -> Result<SupervisorReport>
    where
        F: Future<Output = ()>,
    {
        let backend = backend::create_backend(self.config.backend)?;
        self.up_with(backend, shutdown).await
    }

    /// Supervises the project on the given backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot prepare the project.
    pub async fn up_with<F>(
        &self,
        backend: Arc<dyn ServiceBackend>,
        shutdown: F,
    ) -> Result<SupervisorReport>
    where
        F: Future<Output = ()>,
    {
        let supervisor = Supervisor::new(
            Arc::clone(&self.plan),
            self.project.clone(),
            backend,
            self.config.clone(),
        );
        supervisor.run(shutdown).await
    }

    /// Removes the project's backend resources and its state snapshot.
    ///
    /// Logs are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or teardown fails.
    pub async fn down(&self, remove_volumes: bool) -> Result<()> {
        let backend = backend::create_backend(self.config.backend)?;
        self.down_with(backend.as_ref(), remove_volumes).await
    }

    /// Tears the project down on the given backend.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails or the state file cannot be
    /// removed.
    pub async fn down_with(&self, backend: &dyn ServiceBackend, remove_volumes: bool) -> Result<()> {
        tracing::info!(project = %self.project.name, remove_volumes, "tearing down project");
        backend
            .teardown(&self.project, self.plan.descriptor(), remove_volumes)
            .await?;
        let state_file = self.project.state_file();
        if state_file.exists() {
            std::fs::remove_file(&state_file).map_err(|e| BerthError::Io {
                path: state_file,
                source: e,
            })?;
        }
        Ok(())
    }

    /// Returns the last persisted snapshot, if any run wrote one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    pub fn status(&self) -> Result<Option<StateSnapshot>> {
        state::load_state(&self.project.state_file())
    }

    /// Returns the captured output of a service.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::NotFound`] if the descriptor has no such
    /// service, or an I/O error if the log cannot be read.
    pub fn logs(&self, service: &str) -> Result<String> {
        if self.plan.service(service).is_none() {
            return Err(BerthError::NotFound {
                kind: "service",
                id: service.to_string(),
            });
        }
        logs::read_logs(&self.project.logs_dir(), service)
    }
}
