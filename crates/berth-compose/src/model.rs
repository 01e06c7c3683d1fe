//! In-memory model of a parsed deployment descriptor.
//!
//! Services and volumes keep their declaration order; the dependency
//! resolver breaks ties with it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use berth_common::types::RestartPolicy;
use serde::Serialize;

/// Root of a parsed descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    /// Optional top-level `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Services in declaration order.
    pub services: Vec<Service>,
    /// Volumes in declaration order.
    pub volumes: Vec<Volume>,
}

impl Descriptor {
    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Looks up a volume by name.
    #[must_use]
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Returns service names in declaration order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.name.as_str())
    }

    /// Returns the services that mount the named volume.
    pub fn volume_users<'a>(&'a self, volume: &'a str) -> impl Iterator<Item = &'a Service> {
        self.services
            .iter()
            .filter(move |s| s.mounts.iter().any(|m| m.volume_name() == Some(volume)))
    }
}

/// A named deployable unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Service name, also its hostname on the shared network.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Optional command override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    /// Mounts in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    /// Environment files, relative to the descriptor directory.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_files: Vec<PathBuf>,
    /// Inline environment; `None` values are inherited from the caller.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, Option<String>>,
    /// Services that must be running before this one starts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// What happens when the process exits.
    pub restart: RestartPolicy,
    /// Ports published to the host.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
}

/// Command override, in either shell or exec form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// A single string run through `/bin/sh -c`.
    Shell(String),
    /// An argument vector run directly.
    Exec(Vec<String>),
}

impl Command {
    /// Returns the argument vector that runs this command.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Shell(line) => vec!["/bin/sh".into(), "-c".into(), line.clone()],
            Self::Exec(args) => args.clone(),
        }
    }
}

/// A named persistent storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    /// Volume name as declared.
    pub name: String,
    /// Backing store.
    pub backing: VolumeBacking,
}

/// How a declared volume is backed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VolumeBacking {
    /// Created and owned by the project.
    Named {
        /// Volume driver, backend default when `None`.
        #[serde(skip_serializing_if = "Option::is_none")]
        driver: Option<String>,
    },
    /// Pre-existing, never created or removed by the project.
    External {
        /// Name outside the project, the declared name when `None`.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// One mount of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    /// Where the data comes from.
    pub source: MountSource,
    /// Absolute path inside the container.
    pub target: String,
    /// Whether the mount is read-only.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl Mount {
    /// Returns the referenced volume name, if the source is a named volume.
    #[must_use]
    pub fn volume_name(&self) -> Option<&str> {
        match &self.source {
            MountSource::Volume(name) => Some(name),
            MountSource::Host(_) | MountSource::Anonymous => None,
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            MountSource::Volume(name) => write!(f, "{name}:{}", self.target)?,
            MountSource::Host(path) => write!(f, "{}:{}", path.display(), self.target)?,
            MountSource::Anonymous => write!(f, "{}", self.target)?,
        }
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

/// Source side of a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountSource {
    /// A volume declared in the top-level `volumes` section.
    Volume(String),
    /// A host path, possibly relative to the descriptor directory.
    Host(PathBuf),
    /// A fresh anonymous volume.
    Anonymous,
}

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// A port published to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// Host address to bind, all interfaces when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    /// Host port, ephemeral when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    /// Port inside the container.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = &self.host_ip {
            write!(f, "{ip}:")?;
        }
        match (self.host_port, &self.host_ip) {
            (Some(port), _) => write!(f, "{port}:")?,
            (None, Some(_)) => write!(f, ":")?,
            (None, None) => {}
        }
        write!(f, "{}", self.container_port)?;
        if self.protocol != Protocol::Tcp {
            write!(f, "/{}", self.protocol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_command_runs_through_sh() {
        let cmd = Command::Shell("cp -r /app/build/. /frontend_static/".into());
        assert_eq!(
            cmd.argv(),
            vec!["/bin/sh", "-c", "cp -r /app/build/. /frontend_static/"]
        );
    }

    #[test]
    fn mount_display_matches_short_syntax() {
        let mount = Mount {
            source: MountSource::Host(PathBuf::from("./nginx.conf")),
            target: "/etc/nginx/conf.d/default.conf".into(),
            read_only: true,
        };
        assert_eq!(
            mount.to_string(),
            "./nginx.conf:/etc/nginx/conf.d/default.conf:ro"
        );
    }

    #[test]
    fn port_display_matches_short_syntax() {
        let port = PortMapping {
            host_ip: None,
            host_port: Some(80),
            container_port: 80,
            protocol: Protocol::Tcp,
        };
        assert_eq!(port.to_string(), "80:80");

        let udp = PortMapping {
            host_ip: Some("127.0.0.1".into()),
            host_port: None,
            container_port: 53,
            protocol: Protocol::Udp,
        };
        assert_eq!(udp.to_string(), "127.0.0.1::53/udp");
    }

    #[test]
    fn volume_users_follow_declaration_order() {
        let mount = |name: &str| Mount {
            source: MountSource::Volume(name.into()),
            target: "/data".into(),
            read_only: false,
        };
        let descriptor = Descriptor {
            name: None,
            services: vec![
                Service {
                    name: "backend".into(),
                    mounts: vec![mount("static")],
                    ..Service::default()
                },
                Service {
                    name: "db".into(),
                    mounts: vec![mount("pg_data")],
                    ..Service::default()
                },
                Service {
                    name: "nginx".into(),
                    mounts: vec![mount("static")],
                    ..Service::default()
                },
            ],
            volumes: Vec::new(),
        };
        let users: Vec<_> = descriptor
            .volume_users("static")
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(users, vec!["backend", "nginx"]);
    }
}
