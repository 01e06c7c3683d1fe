//! Published port syntax: `[HOST_IP:][HOST:]CONTAINER[/PROTOCOL]`.

use berth_common::error::Result;
use serde_yaml::Value;

use super::{KeyPath, Node, kind_of};
use crate::model::{PortMapping, Protocol};

pub(super) fn parse_ports(path: &KeyPath, value: &Value) -> Result<Vec<PortMapping>> {
    Node::new(path, value)
        .expect_sequence()?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = path.index(i);
            let node = Node::new(&item_path, item);
            match item {
                Value::Number(n) => {
                    let port = n
                        .as_u64()
                        .and_then(|p| u16::try_from(p).ok())
                        .filter(|p| *p != 0)
                        .ok_or_else(|| node.err(format!("port {n} is out of range")))?;
                    Ok(PortMapping {
                        host_ip: None,
                        host_port: None,
                        container_port: port,
                        protocol: Protocol::Tcp,
                    })
                }
                Value::String(spec) => parse_spec(node, spec),
                other => Err(node.err(format!(
                    "expected a port string or number, got {}",
                    kind_of(other)
                ))),
            }
        })
        .collect()
}

fn parse_port(node: Node<'_>, raw: &str) -> Result<u16> {
    raw.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| node.err(format!("invalid port \"{raw}\"")))
}

fn parse_spec(node: Node<'_>, spec: &str) -> Result<PortMapping> {
    let (addr, protocol) = match spec.split_once('/') {
        Some((addr, "tcp")) => (addr, Protocol::Tcp),
        Some((addr, "udp")) => (addr, Protocol::Udp),
        Some((_, other)) => return Err(node.err(format!("unsupported protocol \"{other}\""))),
        None => (spec, Protocol::Tcp),
    };

    let parts: Vec<&str> = addr.split(':').collect();
    let (host_ip, host_port, container) = match parts.as_slice() {
        [container] => (None, None, *container),
        [host, container] => (None, Some(parse_port(node, host)?), *container),
        [ip, host, container] => {
            let host = if host.is_empty() {
                None
            } else {
                Some(parse_port(node, host)?)
            };
            (Some((*ip).to_string()), host, *container)
        }
        _ => return Err(node.err(format!("malformed port mapping \"{spec}\""))),
    };

    Ok(PortMapping {
        host_ip,
        host_port,
        container_port: parse_port(node, container)?,
        protocol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_common::error::BerthError;

    fn parse(yaml: &str) -> Result<Vec<PortMapping>> {
        let value: Value = serde_yaml::from_str(yaml).expect("yaml");
        parse_ports(&KeyPath::root().key("ports"), &value)
    }

    #[test]
    fn host_and_container_port() {
        let ports = parse("[\"80:80\"]").expect("parse");
        assert_eq!(ports[0].host_port, Some(80));
        assert_eq!(ports[0].container_port, 80);
        assert_eq!(ports[0].protocol, Protocol::Tcp);
    }

    #[test]
    fn unquoted_mapping_is_a_string() {
        let ports = parse("- 8000:80\n").expect("parse");
        assert_eq!(ports[0].host_port, Some(8000));
        assert_eq!(ports[0].container_port, 80);
    }

    #[test]
    fn bare_number_is_container_port() {
        let ports = parse("[5432]").expect("parse");
        assert_eq!(ports[0].host_port, None);
        assert_eq!(ports[0].container_port, 5432);
    }

    #[test]
    fn ip_and_protocol() {
        let ports = parse("[\"127.0.0.1:5353:53/udp\", \"127.0.0.1::9000\"]").expect("parse");
        assert_eq!(ports[0].host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(ports[0].host_port, Some(5353));
        assert_eq!(ports[0].protocol, Protocol::Udp);
        assert_eq!(ports[1].host_port, None);
        assert_eq!(ports[1].container_port, 9000);
    }

    #[test]
    fn invalid_port_names_item() {
        let err = parse("[\"80:http\"]").unwrap_err();
        assert!(
            matches!(&err, BerthError::Parse { key, .. } if key == "ports[0]"),
            "got: {err}"
        );
    }

    #[test]
    fn out_of_range_port_fails() {
        assert!(parse("[70000]").is_err());
        assert!(parse("[\"0:80\"]").is_err());
        assert!(parse("[\"80/sctp\"]").is_err());
    }
}
