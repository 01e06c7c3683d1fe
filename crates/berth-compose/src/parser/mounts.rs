//! Service mount syntax.
//!
//! Short form is `[SOURCE:]TARGET[:MODE]`; long form is a mapping with
//! `type`, `source`, `target` and `read_only`.

use std::path::PathBuf;

use berth_common::error::Result;
use serde_yaml::Value;

use super::{KeyPath, Node, kind_of};
use crate::model::{Mount, MountSource};

pub(super) fn parse_mounts(path: &KeyPath, value: &Value) -> Result<Vec<Mount>> {
    Node::new(path, value)
        .expect_sequence()?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = path.index(i);
            let node = Node::new(&item_path, item);
            match item {
                Value::String(spec) => parse_short(node, spec),
                Value::Mapping(_) => parse_long(&item_path, node),
                other => Err(node.err(format!(
                    "expected a mount string or mapping, got {}",
                    kind_of(other)
                ))),
            }
        })
        .collect()
}

/// Host paths are recognised by their leading character, as compose does.
fn is_host_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

fn source_of(source: &str) -> MountSource {
    if is_host_path(source) {
        MountSource::Host(PathBuf::from(source))
    } else {
        MountSource::Volume(source.to_string())
    }
}

fn parse_mode(node: Node<'_>, mode: &str) -> Result<bool> {
    let mut read_only = false;
    for flag in mode.split(',') {
        match flag {
            "ro" => read_only = true,
            "rw" | "z" | "Z" | "cached" | "delegated" | "consistent" => {}
            other => return Err(node.err(format!("unknown mount mode \"{other}\""))),
        }
    }
    Ok(read_only)
}

fn parse_short(node: Node<'_>, spec: &str) -> Result<Mount> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (source, target, read_only) = match parts.as_slice() {
        [target] => (MountSource::Anonymous, *target, false),
        [source, target] => (source_of(source), *target, false),
        [source, target, mode] => (source_of(source), *target, parse_mode(node, mode)?),
        _ => return Err(node.err(format!("malformed mount \"{spec}\""))),
    };
    if target.is_empty() || matches!(&source, MountSource::Volume(name) if name.is_empty()) {
        return Err(node.err(format!("malformed mount \"{spec}\"")));
    }
    Ok(Mount {
        source,
        target: target.to_string(),
        read_only,
    })
}

fn parse_long(path: &KeyPath, node: Node<'_>) -> Result<Mount> {
    let mut kind = None;
    let mut source = None;
    let mut target = None;
    let mut read_only = false;

    for (key, value) in node.expect_mapping()? {
        let key_path = path.key(&key);
        let child = Node::new(&key_path, value);
        match key.as_str() {
            "type" => kind = Some(child.expect_str()?.to_string()),
            "source" => source = Some(child.expect_str()?.to_string()),
            "target" => target = Some(child.expect_str()?.to_string()),
            "read_only" => {
                read_only = value
                    .as_bool()
                    .ok_or_else(|| child.err("expected true or false"))?;
            }
            other => return Err(child.err(format!("unknown mount key \"{other}\""))),
        }
    }

    let target = target.ok_or_else(|| Node::new(&path.key("target"), node.value).err("missing required key"))?;
    let source = match (kind.as_deref(), source) {
        (Some("volume") | None, None) => MountSource::Anonymous,
        (Some("volume") | None, Some(name)) if !is_host_path(&name) => MountSource::Volume(name),
        (Some("bind") | None, Some(host)) => MountSource::Host(PathBuf::from(host)),
        (Some("bind"), None) => {
            return Err(Node::new(&path.key("source"), node.value).err("a bind mount needs a source"));
        }
        (Some("volume"), Some(name)) => {
            return Err(Node::new(&path.key("source"), node.value)
                .err(format!("\"{name}\" is a host path, not a volume name")));
        }
        (Some(other), _) => {
            return Err(Node::new(&path.key("type"), node.value)
                .err(format!("unsupported mount type \"{other}\" (expected volume or bind)")));
        }
    };

    Ok(Mount {
        source,
        target,
        read_only,
    })
}
