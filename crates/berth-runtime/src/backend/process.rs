//! Backend that runs each service's `command` directly on the host.
//!
//! There is no image and no isolation: the image reference is only
//! recorded. Named volumes become directories under
//! `<state_dir>/volumes/`, exposed to the process as
//! `BERTH_VOLUME_<NAME>` variables.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use berth_common::error::{BerthError, Result};
use berth_compose::model::{Descriptor, MountSource, Service, Volume, VolumeBacking};
use tokio::process::Command;

use super::child::ChildProcess;
use super::{ServiceBackend, ServiceProcess};
use crate::project::Project;
use crate::{env_file, logs};

/// Runs services as local processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl ProcessBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Directory backing a volume.
#[must_use]
pub fn volume_dir(project: &Project, volume: &Volume) -> PathBuf {
    project
        .state_dir
        .join("volumes")
        .join(project.volume_name(volume))
}

/// Environment variable that carries a volume's directory.
#[must_use]
pub fn volume_var(volume: &str) -> String {
    let suffix: String = volume
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("BERTH_VOLUME_{suffix}")
}

/// Collects the environment of a service: env files first, then the
/// `environment` section, then the berth variables.
///
/// # Errors
///
/// Returns an error if an env file cannot be read or parsed.
pub fn service_env(
    project: &Project,
    descriptor: &Descriptor,
    service: &Service,
) -> Result<Vec<(String, String)>> {
    let mut env = Vec::new();
    for path in &service.env_files {
        env.extend(env_file::read_env_file(&project.resolve(path))?);
    }
    for (key, value) in &service.environment {
        let value = match value {
            Some(v) => Some(v.clone()),
            None => std::env::var(key).ok(),
        };
        if let Some(value) = value {
            env.push((key.clone(), value));
        }
    }
    env.push(("BERTH_PROJECT".into(), project.name.clone()));
    env.push(("BERTH_SERVICE".into(), service.name.clone()));
    for mount in &service.mounts {
        if let MountSource::Volume(name) = &mount.source {
            if let Some(volume) = descriptor.volume(name) {
                let dir = volume_dir(project, volume);
                env.push((volume_var(name), dir.display().to_string()));
            }
        }
    }
    Ok(env)
}

#[async_trait]
impl ServiceBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn prepare(&self, project: &Project, descriptor: &Descriptor) -> Result<()> {
        for volume in &descriptor.volumes {
            let dir = volume_dir(project, volume);
            if matches!(volume.backing, VolumeBacking::External { .. }) && !dir.is_dir() {
                return Err(BerthError::NotFound {
                    kind: "external volume",
                    id: dir.display().to_string(),
                });
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| BerthError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
            tracing::debug!(volume = %volume.name, dir = %dir.display(), "volume ready");
        }
        Ok(())
    }

    async fn start(
        &self,
        project: &Project,
        descriptor: &Descriptor,
        service: &Service,
    ) -> Result<Box<dyn ServiceProcess>> {
        let Some(command) = &service.command else {
            return Err(BerthError::backend(
                &service.name,
                format!(
                    "no command to run for image \"{}\" on the process backend",
                    service.image
                ),
            ));
        };
        let argv = command.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(BerthError::backend(&service.name, "empty command"));
        };

        let env = service_env(project, descriptor, service)?;
        let log = logs::open_log(&project.logs_dir(), &service.name)?;
        let stderr = log.try_clone().map_err(|e| BerthError::Io {
            path: logs::log_path(&project.logs_dir(), &service.name),
            source: e,
        })?;

        let child = Command::new(program)
            .args(args)
            .envs(env)
            .current_dir(&project.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BerthError::backend(&service.name, format!("failed to spawn {program}: {e}"))
            })?;
        tracing::debug!(service = %service.name, pid = ?child.id(), "process spawned");
        Ok(Box::new(ChildProcess::new(&service.name, child)))
    }

    async fn teardown(
        &self,
        project: &Project,
        descriptor: &Descriptor,
        remove_volumes: bool,
    ) -> Result<()> {
        if !remove_volumes {
            return Ok(());
        }
        for volume in &descriptor.volumes {
            if matches!(volume.backing, VolumeBacking::External { .. }) {
                continue;
            }
            let dir = volume_dir(project, volume);
            if !dir.exists() {
                continue;
            }
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| BerthError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
            tracing::info!(volume = %volume.name, "volume removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "\
volumes:
  pg_data:
  static-files:
services:
  db:
    image: postgres:13.10
    env_file: .env
    environment:
      PGDATA: /var/lib/postgresql/data
    volumes:
      - pg_data:/var/lib/postgresql/data
      - static-files:/static
";

    #[test]
    fn volume_vars_are_shell_safe() {
        assert_eq!(volume_var("pg_data"), "BERTH_VOLUME_PG_DATA");
        assert_eq!(volume_var("static-files"), "BERTH_VOLUME_STATIC_FILES");
    }

    #[test]
    fn environment_layers_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".env"), "POSTGRES_USER=foodgram\nPGDATA=/ignored\n")
            .expect("write env");
        let project = Project::new("foodgram", dir.path());
        let descriptor = berth_compose::parser::parse_descriptor(DESCRIPTOR).expect("parse");
        let db = descriptor.service("db").expect("db");

        let env = service_env(&project, &descriptor, db).expect("env");
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "POSTGRES_USER",
                "PGDATA",
                "PGDATA",
                "BERTH_PROJECT",
                "BERTH_SERVICE",
                "BERTH_VOLUME_PG_DATA",
                "BERTH_VOLUME_STATIC_FILES",
            ]
        );
        let pg_dir = project.state_dir.join("volumes").join("foodgram_pg_data");
        assert!(env.contains(&(
            "BERTH_VOLUME_PG_DATA".into(),
            pg_dir.display().to_string()
        )));
    }

    #[tokio::test]
    async fn prepare_creates_volume_dirs_and_teardown_removes_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = Project::new("foodgram", dir.path());
        let descriptor = berth_compose::parser::parse_descriptor(DESCRIPTOR).expect("parse");
        let backend = ProcessBackend::new();

        backend.prepare(&project, &descriptor).await.expect("prepare");
        let pg = volume_dir(&project, &descriptor.volumes[0]);
        assert!(pg.is_dir());

        backend
            .teardown(&project, &descriptor, true)
            .await
            .expect("teardown");
        assert!(!pg.exists());
    }

    #[tokio::test]
    async fn start_without_command_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".env"), "").expect("write env");
        let project = Project::new("foodgram", dir.path());
        let descriptor = berth_compose::parser::parse_descriptor(DESCRIPTOR).expect("parse");
        let db = descriptor.service("db").expect("db");

        let result = ProcessBackend::new().start(&project, &descriptor, db).await;
        assert!(matches!(result, Err(BerthError::Backend { .. })));
    }
}
