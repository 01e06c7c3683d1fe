//! Backend that runs each service as a container through the `docker` CLI.
//!
//! Every container runs in the foreground of a `docker run` child process,
//! so exit codes and output flow back exactly as they do for host
//! processes. Resources carry a `berth.project` label.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use berth_common::error::{BerthError, Result};
use berth_common::types::ExitStatus;
use berth_compose::model::{Descriptor, MountSource, Service, VolumeBacking};
use tokio::process::Command;

use super::child::ChildProcess;
use super::{ServiceBackend, ServiceProcess};
use crate::logs;
use crate::project::Project;

const PROJECT_LABEL: &str = "berth.project";
const SERVICE_LABEL: &str = "berth.service";

/// Drives a local docker daemon.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    binary: PathBuf,
}

impl DockerBackend {
    /// Locates the `docker` binary on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Backend`] if it cannot be found.
    pub fn locate() -> Result<Self> {
        let binary = which::which("docker").map_err(|e| {
            BerthError::backend("docker", format!("docker binary not found on PATH: {e}"))
        })?;
        tracing::debug!(binary = %binary.display(), "docker backend located");
        Ok(Self { binary })
    }

    /// Runs a short docker command to completion, returning its stdout.
    async fn docker(&self, resource: &str, args: &[&str]) -> Result<String> {
        tracing::debug!(?args, "docker");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BerthError::backend(resource, format!("failed to run docker: {e}")))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(BerthError::backend(
                resource,
                format!(
                    "docker {} failed: {}",
                    args.first().copied().unwrap_or_default(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }

    async fn ensure_network(&self, project: &Project) -> Result<()> {
        let network = project.network_name();
        if self.docker(&network, &["network", "inspect", network.as_str()]).await.is_ok() {
            return Ok(());
        }
        let label = format!("{PROJECT_LABEL}={}", project.name);
        let _ = self
            .docker(&network, &["network", "create", "--label", label.as_str(), network.as_str()])
            .await?;
        tracing::info!(network = %network, "network created");
        Ok(())
    }
}

#[async_trait]
impl ServiceBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn prepare(&self, project: &Project, descriptor: &Descriptor) -> Result<()> {
        self.ensure_network(project).await?;
        for volume in &descriptor.volumes {
            let name = project.volume_name(volume);
            match &volume.backing {
                VolumeBacking::External { .. } => {
                    let _ = self
                        .docker(&name, &["volume", "inspect", name.as_str()])
                        .await
                        .map_err(|_| BerthError::NotFound {
                            kind: "external volume",
                            id: name.clone(),
                        })?;
                }
                VolumeBacking::Named { driver } => {
                    let label = format!("{PROJECT_LABEL}={}", project.name);
                    let mut args = vec!["volume", "create", "--label", label.as_str()];
                    if let Some(driver) = driver {
                        args.extend(["--driver", driver.as_str()]);
                    }
                    args.push(name.as_str());
                    let _ = self.docker(&name, &args).await?;
                    tracing::info!(volume = %name, "volume ready");
                }
            }
        }
        Ok(())
    }

    async fn start(
        &self,
        project: &Project,
        descriptor: &Descriptor,
        service: &Service,
    ) -> Result<Box<dyn ServiceProcess>> {
        let container = project.container_name(&service.name);
        // Leftovers from a crashed run would make the name collide.
        let _ = self.docker(&container, &["rm", "-f", container.as_str()]).await;

        let log = logs::open_log(&project.logs_dir(), &service.name)?;
        let stderr = log.try_clone().map_err(|e| BerthError::Io {
            path: logs::log_path(&project.logs_dir(), &service.name),
            source: e,
        })?;

        let args = run_args(project, descriptor, service);
        tracing::debug!(service = %service.name, ?args, "docker run");
        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BerthError::backend(&service.name, format!("failed to spawn docker run: {e}"))
            })?;

        Ok(Box::new(DockerProcess {
            backend: self.clone(),
            container,
            inner: ChildProcess::new(&service.name, child),
        }))
    }

    async fn teardown(
        &self,
        project: &Project,
        descriptor: &Descriptor,
        remove_volumes: bool,
    ) -> Result<()> {
        for service in &descriptor.services {
            let container = project.container_name(&service.name);
            if self.docker(&container, &["rm", "-f", container.as_str()]).await.is_ok() {
                tracing::info!(container = %container, "container removed");
            }
        }

        let network = project.network_name();
        match self.docker(&network, &["network", "rm", network.as_str()]).await {
            Ok(_) => tracing::info!(network = %network, "network removed"),
            Err(e) => tracing::warn!(network = %network, error = %e, "network not removed"),
        }

        if remove_volumes {
            for volume in &descriptor.volumes {
                if matches!(volume.backing, VolumeBacking::External { .. }) {
                    continue;
                }
                let name = project.volume_name(volume);
                match self.docker(&name, &["volume", "rm", name.as_str()]).await {
                    Ok(_) => tracing::info!(volume = %name, "volume removed"),
                    Err(e) => tracing::warn!(volume = %name, error = %e, "volume not removed"),
                }
            }
        }
        Ok(())
    }
}

/// A `docker run` child plus the container it runs.
struct DockerProcess {
    backend: DockerBackend,
    container: String,
    inner: ChildProcess,
}

#[async_trait]
impl ServiceProcess for DockerProcess {
    fn pid(&self) -> Option<u32> {
        self.inner.pid()
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        self.inner.wait().await
    }

    async fn stop(&mut self, grace: Duration) -> Result<ExitStatus> {
        let secs = stop_timeout(grace).to_string();
        if let Err(e) = self
            .backend
            .docker(&self.container, &["stop", "--time", secs.as_str(), self.container.as_str()])
            .await
        {
            tracing::warn!(container = %self.container, error = %e, "docker stop failed");
        }
        self.inner.stop(grace).await
    }
}

/// Whole seconds for `docker stop --time`, rounded up so a sub-second
/// grace still gets a graceful stop.
const fn stop_timeout(grace: Duration) -> u128 {
    grace.as_millis().div_ceil(1000)
}

/// Builds the `docker run` arguments for a service.
#[must_use]
pub fn run_args(project: &Project, descriptor: &Descriptor, service: &Service) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--name".into(),
        project.container_name(&service.name),
        "--network".into(),
        project.network_name(),
        "--network-alias".into(),
        service.name.clone(),
        "--label".into(),
        format!("{PROJECT_LABEL}={}", project.name),
        "--label".into(),
        format!("{SERVICE_LABEL}={}", service.name),
    ];

    for env_file in &service.env_files {
        args.push("--env-file".into());
        args.push(project.resolve(env_file).display().to_string());
    }
    for (key, value) in &service.environment {
        args.push("-e".into());
        args.push(value.as_ref().map_or_else(|| key.clone(), |v| format!("{key}={v}")));
    }

    for mount in &service.mounts {
        let mut spec = match &mount.source {
            MountSource::Volume(name) => {
                let backend_name = descriptor
                    .volume(name)
                    .map_or_else(|| name.clone(), |v| project.volume_name(v));
                format!("type=volume,source={backend_name},target={}", mount.target)
            }
            MountSource::Host(path) => format!(
                "type=bind,source={},target={}",
                project.resolve(path).display(),
                mount.target
            ),
            MountSource::Anonymous => format!("type=volume,target={}", mount.target),
        };
        if mount.read_only {
            spec.push_str(",readonly");
        }
        args.push("--mount".into());
        args.push(spec);
    }

    for port in &service.ports {
        args.push("-p".into());
        args.push(port.to_string());
    }

    args.push(service.image.clone());
    if let Some(command) = &service.command {
        args.extend(command.argv());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOODGRAM: &str = "\
volumes:
  pg_data:
  static:
  shared:
    external: true
    name: infra_shared
services:
  nginx:
    image: nginx:1.22.1
    ports:
      - 80:80
    volumes:
      - ./nginx.conf:/etc/nginx/conf.d/default.conf:ro
      - static:/staticfiles/
      - shared:/shared
  frontend:
    image: foodgram/foodgram_frontend
    env_file: .env
    environment:
      NODE_ENV: production
      DEBUG:
    command: cp -r /app/build/. /frontend_static/
    volumes:
      - /cache
";

    fn descriptor() -> Descriptor {
        berth_compose::parser::parse_descriptor(FOODGRAM).expect("parse")
    }

    #[test]
    fn run_args_for_proxy() {
        let project = Project::new("foodgram", "/srv/foodgram");
        let descriptor = descriptor();
        let nginx = descriptor.service("nginx").expect("nginx");
        let args = run_args(&project, &descriptor, nginx);

        let expected: Vec<String> = [
            "run",
            "--rm",
            "--name",
            "foodgram-nginx-1",
            "--network",
            "foodgram_default",
            "--network-alias",
            "nginx",
            "--label",
            "berth.project=foodgram",
            "--label",
            "berth.service=nginx",
            "--mount",
            "type=bind,source=/srv/foodgram/./nginx.conf,target=/etc/nginx/conf.d/default.conf,readonly",
            "--mount",
            "type=volume,source=foodgram_static,target=/staticfiles/",
            "--mount",
            "type=volume,source=infra_shared,target=/shared",
            "-p",
            "80:80",
            "nginx:1.22.1",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn run_args_carry_environment_and_command() {
        let project = Project::new("foodgram", "/srv/foodgram");
        let descriptor = descriptor();
        let frontend = descriptor.service("frontend").expect("frontend");
        let args = run_args(&project, &descriptor, frontend);

        let pairs: Vec<(&str, &str)> = args
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();
        assert!(pairs.contains(&("--env-file", "/srv/foodgram/.env")));
        assert!(pairs.contains(&("-e", "NODE_ENV=production")));
        assert!(pairs.contains(&("-e", "DEBUG")));
        assert!(pairs.contains(&("--mount", "type=volume,target=/cache")));

        let image_at = args
            .iter()
            .position(|a| a == "foodgram/foodgram_frontend")
            .expect("image present");
        assert_eq!(
            &args[image_at + 1..],
            ["/bin/sh", "-c", "cp -r /app/build/. /frontend_static/"]
        );
    }

    #[test]
    fn stop_timeout_rounds_up_to_whole_seconds() {
        assert_eq!(stop_timeout(Duration::ZERO), 0);
        assert_eq!(stop_timeout(Duration::from_millis(300)), 1);
        assert_eq!(stop_timeout(Duration::from_secs(10)), 10);
        assert_eq!(stop_timeout(Duration::from_millis(10_001)), 11);
    }
}
