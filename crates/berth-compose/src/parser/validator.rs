//! Static analysis of a parsed descriptor.
//!
//! Checks names, service and volume references, and port conflicts before
//! the descriptor is planned. Cycles are left to the dependency graph.

use std::collections::{HashMap, HashSet};

use berth_common::error::{BerthError, Result};

use crate::model::{Descriptor, Protocol};

/// Validates a parsed descriptor for semantic correctness.
///
/// # Checks performed
///
/// 1. Service and volume names are non-empty and use `[A-Za-z0-9._-]`.
/// 2. No duplicate service or volume names.
/// 3. Every `depends_on` entry names another declared service.
/// 4. Every named-volume mount references a declared volume.
/// 5. Mount targets are absolute container paths.
/// 6. A host port is published at most once per protocol.
///
/// # Errors
///
/// Returns [`BerthError::Reference`] for unresolved references and
/// [`BerthError::Parse`] for every other failed check.
pub fn validate(descriptor: &Descriptor) -> Result<()> {
    tracing::debug!("validating descriptor");
    check_names(descriptor)?;
    check_dependency_references(descriptor)?;
    check_volume_references(descriptor)?;
    check_mount_targets(descriptor)?;
    check_port_conflicts(descriptor)?;
    Ok(())
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn check_names(descriptor: &Descriptor) -> Result<()> {
    let mut seen = HashSet::new();
    for service in &descriptor.services {
        let key = format!("services.{}", service.name);
        if !valid_name(&service.name) {
            return Err(BerthError::parse(
                key,
                "service names may only contain letters, digits, '.', '_' and '-'",
            ));
        }
        if !seen.insert(service.name.as_str()) {
            return Err(BerthError::parse(key, "duplicate service name"));
        }
    }

    let mut seen = HashSet::new();
    for volume in &descriptor.volumes {
        let key = format!("volumes.{}", volume.name);
        if !valid_name(&volume.name) {
            return Err(BerthError::parse(
                key,
                "volume names may only contain letters, digits, '.', '_' and '-'",
            ));
        }
        if !seen.insert(volume.name.as_str()) {
            return Err(BerthError::parse(key, "duplicate volume name"));
        }
    }
    Ok(())
}

fn check_dependency_references(descriptor: &Descriptor) -> Result<()> {
    let names: HashSet<&str> = descriptor.service_names().collect();
    for service in &descriptor.services {
        for (i, dep) in service.depends_on.iter().enumerate() {
            let key = format!("services.{}.depends_on[{i}]", service.name);
            if *dep == service.name {
                return Err(BerthError::parse(key, "a service cannot depend on itself"));
            }
            if !names.contains(dep.as_str()) {
                return Err(BerthError::Reference {
                    kind: "service",
                    name: dep.clone(),
                    referenced_by: key,
                });
            }
        }
    }
    Ok(())
}

fn check_volume_references(descriptor: &Descriptor) -> Result<()> {
    let declared: HashSet<&str> = descriptor.volumes.iter().map(|v| v.name.as_str()).collect();
    for service in &descriptor.services {
        for (i, mount) in service.mounts.iter().enumerate() {
            let Some(volume) = mount.volume_name() else {
                continue;
            };
            if !declared.contains(volume) {
                return Err(BerthError::Reference {
                    kind: "volume",
                    name: volume.to_string(),
                    referenced_by: format!("services.{}.volumes[{i}]", service.name),
                });
            }
        }
    }
    Ok(())
}

fn check_mount_targets(descriptor: &Descriptor) -> Result<()> {
    for service in &descriptor.services {
        for (i, mount) in service.mounts.iter().enumerate() {
            if !mount.target.starts_with('/') {
                return Err(BerthError::parse(
                    format!("services.{}.volumes[{i}]", service.name),
                    format!(
                        "mount target \"{}\" must be an absolute path",
                        mount.target
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_port_conflicts(descriptor: &Descriptor) -> Result<()> {
    let mut published: HashMap<(u16, Protocol), Vec<Option<&str>>> = HashMap::new();
    for service in &descriptor.services {
        for (i, port) in service.ports.iter().enumerate() {
            let Some(host_port) = port.host_port else {
                continue;
            };
            let ip = port.host_ip.as_deref().filter(|ip| !is_wildcard(ip));
            let bound = published.entry((host_port, port.protocol)).or_default();
            // Two binds only coexist on distinct explicit addresses.
            let clash = bound.iter().any(|other| match (other, ip) {
                (Some(a), Some(b)) => *a == b,
                _ => true,
            });
            if clash {
                return Err(BerthError::parse(
                    format!("services.{}.ports[{i}]", service.name),
                    format!("host port {host_port}/{} is already published", port.protocol),
                ));
            }
            bound.push(ip);
        }
    }
    Ok(())
}

fn is_wildcard(ip: &str) -> bool {
    matches!(ip, "0.0.0.0" | "::" | "[::]")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::{Mount, MountSource, PortMapping, Service, Volume, VolumeBacking};

    fn service(name: &str, deps: &[&str]) -> Service {
        Service {
            name: name.into(),
            image: format!("{name}:latest"),
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
            ..Service::default()
        }
    }

    fn named(name: &str) -> Volume {
        Volume {
            name: name.into(),
            backing: VolumeBacking::Named { driver: None },
        }
    }

    fn volume_mount(name: &str, target: &str) -> Mount {
        Mount {
            source: MountSource::Volume(name.into()),
            target: target.into(),
            read_only: false,
        }
    }

    fn port(host: u16) -> PortMapping {
        PortMapping {
            host_ip: None,
            host_port: Some(host),
            container_port: 80,
            protocol: Protocol::Tcp,
        }
    }

    #[test]
    fn validate_empty_descriptor_succeeds() {
        assert!(validate(&Descriptor::default()).is_ok());
    }

    #[test]
    fn validate_valid_descriptor_succeeds() {
        let mut backend = service("backend", &["db"]);
        backend.mounts = vec![volume_mount("static", "/backend_static")];
        let descriptor = Descriptor {
            name: None,
            services: vec![service("db", &[]), backend],
            volumes: vec![named("static")],
        };
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn validate_unknown_dependency_is_reference_error() {
        let descriptor = Descriptor {
            services: vec![service("backend", &["db"])],
            ..Descriptor::default()
        };
        match validate(&descriptor).unwrap_err() {
            BerthError::Reference {
                kind,
                name,
                referenced_by,
            } => {
                assert_eq!(kind, "service");
                assert_eq!(name, "db");
                assert_eq!(referenced_by, "services.backend.depends_on[0]");
            }
            other => panic!("expected reference error, got {other:?}"),
        }
    }

    #[test]
    fn validate_undeclared_volume_is_reference_error() {
        let mut nginx = service("nginx", &[]);
        nginx.mounts = vec![
            volume_mount("static", "/staticfiles"),
            volume_mount("media", "/media"),
        ];
        let descriptor = Descriptor {
            services: vec![nginx],
            volumes: vec![named("static")],
            ..Descriptor::default()
        };
        let err = validate(&descriptor).unwrap_err();
        assert!(
            matches!(&err, BerthError::Reference { kind: "volume", name, .. } if name == "media"),
            "got: {err}"
        );
    }

    #[test]
    fn validate_host_mount_needs_no_declaration() {
        let mut nginx = service("nginx", &[]);
        nginx.mounts = vec![Mount {
            source: MountSource::Host(PathBuf::from("./nginx.conf")),
            target: "/etc/nginx/conf.d/default.conf".into(),
            read_only: true,
        }];
        let descriptor = Descriptor {
            services: vec![nginx],
            ..Descriptor::default()
        };
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn validate_self_dependency_fails() {
        let descriptor = Descriptor {
            services: vec![service("db", &["db"])],
            ..Descriptor::default()
        };
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("itself"), "got: {err}");
    }

    #[test]
    fn validate_invalid_name_fails() {
        let descriptor = Descriptor {
            services: vec![service("my service", &[])],
            ..Descriptor::default()
        };
        assert!(matches!(
            validate(&descriptor),
            Err(BerthError::Parse { .. })
        ));
    }

    #[test]
    fn validate_duplicate_service_fails() {
        let descriptor = Descriptor {
            services: vec![service("db", &[]), service("db", &[])],
            ..Descriptor::default()
        };
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn validate_relative_mount_target_fails() {
        let mut backend = service("backend", &[]);
        backend.mounts = vec![volume_mount("static", "backend_static")];
        let descriptor = Descriptor {
            services: vec![backend],
            volumes: vec![named("static")],
            ..Descriptor::default()
        };
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("absolute"), "got: {err}");
    }

    #[test]
    fn validate_port_conflict_fails() {
        let mut nginx = service("nginx", &[]);
        nginx.ports = vec![port(80)];
        let mut frontend = service("frontend", &[]);
        frontend.ports = vec![port(80)];
        let descriptor = Descriptor {
            services: vec![nginx, frontend],
            ..Descriptor::default()
        };
        let err = validate(&descriptor).unwrap_err();
        assert!(
            matches!(&err, BerthError::Parse { key, .. } if key == "services.frontend.ports[0]"),
            "got: {err}"
        );
    }

    fn bound_port(ip: &str, host: u16) -> PortMapping {
        PortMapping {
            host_ip: Some(ip.into()),
            ..port(host)
        }
    }

    #[test]
    fn validate_port_conflict_across_address_forms_fails() {
        let mut nginx = service("nginx", &[]);
        nginx.ports = vec![port(80)];
        let mut frontend = service("frontend", &[]);
        frontend.ports = vec![bound_port("0.0.0.0", 80)];
        let mut admin = service("admin", &[]);
        admin.ports = vec![bound_port("127.0.0.1", 80)];

        for other in [frontend, admin] {
            let name = other.name.clone();
            let descriptor = Descriptor {
                services: vec![nginx.clone(), other],
                ..Descriptor::default()
            };
            let err = validate(&descriptor).unwrap_err();
            assert!(
                matches!(&err, BerthError::Parse { key, .. } if *key == format!("services.{name}.ports[0]")),
                "got: {err}"
            );
        }
    }

    #[test]
    fn validate_same_port_on_distinct_addresses_succeeds() {
        let mut nginx = service("nginx", &[]);
        nginx.ports = vec![bound_port("127.0.0.1", 80)];
        let mut admin = service("admin", &[]);
        admin.ports = vec![bound_port("10.0.0.5", 80)];
        let descriptor = Descriptor {
            services: vec![nginx, admin],
            ..Descriptor::default()
        };
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn validate_same_port_on_other_protocol_succeeds() {
        let mut dns = service("dns", &[]);
        dns.ports = vec![
            port(53),
            PortMapping {
                protocol: Protocol::Udp,
                ..port(53)
            },
        ];
        let descriptor = Descriptor {
            services: vec![dns],
            ..Descriptor::default()
        };
        assert!(validate(&descriptor).is_ok());
    }
}
