//! Descriptor parser built on `serde_yaml`.
//!
//! Turns raw descriptor text into a validated [`Descriptor`] in two
//! phases: a structural walk over the YAML tree that rejects malformed or
//! unknown keys, then semantic validation of names and references. Every
//! error carries the dotted path of the offending key.

mod mounts;
mod ports;
pub mod validator;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use berth_common::constants::DESCRIPTOR_FILE_NAMES;
use berth_common::error::{BerthError, Result};
use berth_common::types::RestartPolicy;
use serde_yaml::Value;

use crate::model::{Command, Descriptor, Service, Volume, VolumeBacking};

const TOP_LEVEL_KEYS: &[&str] = &["services", "volumes", "version", "name"];

const SERVICE_KEYS: &[&str] = &[
    "image",
    "command",
    "volumes",
    "env_file",
    "environment",
    "depends_on",
    "restart",
    "ports",
];

/// Dotted key path of a value inside the document.
pub(crate) struct KeyPath {
    inner: String,
}

impl KeyPath {
    const fn root() -> Self {
        Self {
            inner: String::new(),
        }
    }

    pub(crate) fn key(&self, key: &str) -> Self {
        if self.inner.is_empty() {
            Self { inner: key.into() }
        } else {
            Self {
                inner: format!("{}.{key}", self.inner),
            }
        }
    }

    pub(crate) fn index(&self, index: usize) -> Self {
        Self {
            inner: format!("{}[{index}]", self.inner),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        if self.inner.is_empty() {
            "<document>"
        } else {
            &self.inner
        }
    }
}

/// A YAML value together with the key path that led to it.
#[derive(Clone, Copy)]
pub(crate) struct Node<'a> {
    path: &'a KeyPath,
    value: &'a Value,
}

impl<'a> Node<'a> {
    pub(crate) const fn new(path: &'a KeyPath, value: &'a Value) -> Self {
        Self { path, value }
    }

    pub(crate) fn err(&self, message: impl Into<String>) -> BerthError {
        BerthError::parse(self.path.as_str(), message)
    }

    pub(crate) fn expect_str(&self) -> Result<&'a str> {
        self.value
            .as_str()
            .ok_or_else(|| self.err(format!("expected a string, got {}", kind_of(self.value))))
    }

    pub(crate) fn expect_mapping(&self) -> Result<Vec<(String, &'a Value)>> {
        let mapping = self
            .value
            .as_mapping()
            .ok_or_else(|| self.err(format!("expected a mapping, got {}", kind_of(self.value))))?;
        mapping
            .iter()
            .map(|(k, v)| match k {
                Value::String(s) => Ok((s.clone(), v)),
                other => Err(self.err(format!(
                    "mapping keys must be strings, got {}",
                    kind_of(other)
                ))),
            })
            .collect()
    }

    pub(crate) fn expect_sequence(&self) -> Result<&'a [Value]> {
        self.value
            .as_sequence()
            .map(Vec::as_slice)
            .ok_or_else(|| self.err(format!("expected a list, got {}", kind_of(self.value))))
    }

    /// Renders a scalar (string, number or bool) as a string.
    pub(crate) fn scalar_string(&self) -> Result<String> {
        match self.value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(self.err(format!("expected a scalar, got {}", kind_of(other)))),
        }
    }
}

pub(crate) const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Parses and validates a descriptor from its source text.
///
/// # Errors
///
/// Returns [`BerthError::Parse`] for malformed input or unknown keys,
/// [`BerthError::Reference`] for unresolved service or volume references.
pub fn parse_descriptor(input: &str) -> Result<Descriptor> {
    tracing::debug!(bytes = input.len(), "parsing descriptor");
    let root: Value = serde_yaml::from_str(input)
        .map_err(|e| BerthError::parse("<document>", format!("malformed YAML: {e}")))?;
    let descriptor = parse_root(&root)?;
    validator::validate(&descriptor)?;
    tracing::info!(
        services = descriptor.services.len(),
        volumes = descriptor.volumes.len(),
        "descriptor parsed"
    );
    Ok(descriptor)
}

/// Reads and parses a descriptor file.
///
/// # Errors
///
/// Returns [`BerthError::Io`] if the file cannot be read, otherwise the
/// errors of [`parse_descriptor`].
pub fn parse_file(path: &Path) -> Result<Descriptor> {
    tracing::info!(path = %path.display(), "loading descriptor");
    let content = std::fs::read_to_string(path).map_err(|e| BerthError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_descriptor(&content)
}

/// Finds the descriptor file in `dir`, trying the usual compose names.
#[must_use]
pub fn find_descriptor(dir: &Path) -> Option<PathBuf> {
    DESCRIPTOR_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn parse_root(root: &Value) -> Result<Descriptor> {
    let root_path = KeyPath::root();
    let node = Node::new(&root_path, root);
    if root.is_null() {
        return Err(node.err("document is empty"));
    }

    let mut descriptor = Descriptor::default();
    let mut saw_services = false;

    for (key, value) in node.expect_mapping()? {
        let path = root_path.key(&key);
        let child = Node::new(&path, value);
        match key.as_str() {
            "services" => {
                saw_services = true;
                descriptor.services = parse_services(&path, value)?;
            }
            "volumes" => descriptor.volumes = parse_volumes(&path, value)?,
            "name" => descriptor.name = Some(child.expect_str()?.to_string()),
            "version" => {
                let _ = child.scalar_string()?;
            }
            other => {
                return Err(child.err(format!(
                    "unknown top-level key \"{other}\" (expected one of {})",
                    TOP_LEVEL_KEYS.join(", ")
                )));
            }
        }
    }

    if !saw_services {
        return Err(BerthError::parse("services", "missing required key"));
    }
    Ok(descriptor)
}

fn parse_services(path: &KeyPath, value: &Value) -> Result<Vec<Service>> {
    let node = Node::new(path, value);
    if value.is_null() {
        return Ok(Vec::new());
    }
    node.expect_mapping()?
        .into_iter()
        .map(|(name, body)| parse_service(&path.key(&name), name, body))
        .collect()
}

fn parse_service(path: &KeyPath, name: String, body: &Value) -> Result<Service> {
    let node = Node::new(path, body);
    let mut service = Service {
        name,
        ..Service::default()
    };
    let mut image = None;

    for (key, value) in node.expect_mapping()? {
        let key_path = path.key(&key);
        let child = Node::new(&key_path, value);
        match key.as_str() {
            "image" => image = Some(child.expect_str()?.to_string()),
            "command" => service.command = Some(parse_command(child)?),
            "volumes" => service.mounts = mounts::parse_mounts(&key_path, value)?,
            "env_file" => service.env_files = parse_env_files(&key_path, value)?,
            "environment" => service.environment = parse_environment(&key_path, value)?,
            "depends_on" => service.depends_on = parse_depends_on(&key_path, value)?,
            "restart" => service.restart = parse_restart(child)?,
            "ports" => service.ports = ports::parse_ports(&key_path, value)?,
            other => {
                return Err(child.err(format!(
                    "unknown service key \"{other}\" (expected one of {})",
                    SERVICE_KEYS.join(", ")
                )));
            }
        }
    }

    service.image = image.ok_or_else(|| {
        BerthError::parse(path.key("image").as_str(), "missing required key")
    })?;
    Ok(service)
}

fn parse_command(node: Node<'_>) -> Result<Command> {
    match node.value {
        Value::String(line) => Ok(Command::Shell(line.clone())),
        Value::Sequence(_) => {
            let args = node
                .expect_sequence()?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| node.err("command arguments must be strings"))
                })
                .collect::<Result<Vec<_>>>()?;
            if args.is_empty() {
                return Err(node.err("command must not be empty"));
            }
            Ok(Command::Exec(args))
        }
        other => Err(node.err(format!(
            "expected a string or a list, got {}",
            kind_of(other)
        ))),
    }
}

fn parse_env_files(path: &KeyPath, value: &Value) -> Result<Vec<PathBuf>> {
    let node = Node::new(path, value);
    match value {
        Value::String(file) => Ok(vec![PathBuf::from(file)]),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_path = path.index(i);
                Node::new(&item_path, item).expect_str().map(PathBuf::from)
            })
            .collect(),
        other => Err(node.err(format!(
            "expected a string or a list, got {}",
            kind_of(other)
        ))),
    }
}

fn parse_environment(path: &KeyPath, value: &Value) -> Result<BTreeMap<String, Option<String>>> {
    let node = Node::new(path, value);
    let mut env = BTreeMap::new();
    match value {
        Value::Mapping(_) => {
            for (key, val) in node.expect_mapping()? {
                let key_path = path.key(&key);
                let parsed = if val.is_null() {
                    None
                } else {
                    Some(Node::new(&key_path, val).scalar_string()?)
                };
                let _ = env.insert(key, parsed);
            }
        }
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = path.index(i);
                let entry = Node::new(&item_path, item).expect_str()?;
                let (key, val) = match entry.split_once('=') {
                    Some((k, v)) => (k, Some(v.to_string())),
                    None => (entry, None),
                };
                if key.is_empty() {
                    return Err(Node::new(&item_path, item).err("empty variable name"));
                }
                let _ = env.insert(key.to_string(), val);
            }
        }
        other => {
            return Err(node.err(format!(
                "expected a mapping or a list, got {}",
                kind_of(other)
            )));
        }
    }
    Ok(env)
}

fn parse_depends_on(path: &KeyPath, value: &Value) -> Result<Vec<String>> {
    let node = Node::new(path, value);
    let mut deps: Vec<String> = Vec::new();
    let mut push = |dep: String, at: &KeyPath| {
        if deps.contains(&dep) {
            return Err(BerthError::parse(
                at.as_str(),
                format!("dependency \"{dep}\" is listed twice"),
            ));
        }
        deps.push(dep);
        Ok(())
    };

    match value {
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = path.index(i);
                let dep = Node::new(&item_path, item).expect_str()?.to_string();
                push(dep, &item_path)?;
            }
        }
        Value::Mapping(_) => {
            for (dep, options) in node.expect_mapping()? {
                let dep_path = path.key(&dep);
                check_dependency_options(&dep_path, options)?;
                push(dep, &dep_path)?;
            }
        }
        other => {
            return Err(node.err(format!(
                "expected a list or a mapping, got {}",
                kind_of(other)
            )));
        }
    }
    Ok(deps)
}

/// Only `condition: service_started` is meaningful without health checks.
fn check_dependency_options(path: &KeyPath, options: &Value) -> Result<()> {
    if options.is_null() {
        return Ok(());
    }
    for (key, value) in Node::new(path, options).expect_mapping()? {
        let key_path = path.key(&key);
        let child = Node::new(&key_path, value);
        match key.as_str() {
            "condition" => {
                let condition = child.expect_str()?;
                if condition != "service_started" {
                    return Err(child.err(format!(
                        "unsupported condition \"{condition}\" (only service_started)"
                    )));
                }
            }
            "restart" | "required" => {
                let _ = child.scalar_string()?;
            }
            other => return Err(child.err(format!("unknown dependency option \"{other}\""))),
        }
    }
    Ok(())
}

fn parse_restart(node: Node<'_>) -> Result<RestartPolicy> {
    // `no` is a plain string under YAML 1.2, but tolerate a boolean `false`.
    if node.value == &Value::Bool(false) {
        return Ok(RestartPolicy::Never);
    }
    node.expect_str()?
        .parse()
        .map_err(|message: String| node.err(message))
}

fn parse_volumes(path: &KeyPath, value: &Value) -> Result<Vec<Volume>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    Node::new(path, value)
        .expect_mapping()?
        .into_iter()
        .map(|(name, body)| parse_volume(&path.key(&name), name, body))
        .collect()
}

fn parse_volume(path: &KeyPath, name: String, body: &Value) -> Result<Volume> {
    if body.is_null() {
        return Ok(Volume {
            name,
            backing: VolumeBacking::Named { driver: None },
        });
    }

    let mut driver = None;
    let mut external = false;
    let mut external_name = None;
    for (key, value) in Node::new(path, body).expect_mapping()? {
        let key_path = path.key(&key);
        let child = Node::new(&key_path, value);
        match key.as_str() {
            "driver" => driver = Some(child.expect_str()?.to_string()),
            "external" => {
                external = value
                    .as_bool()
                    .ok_or_else(|| child.err("expected true or false"))?;
            }
            "name" => external_name = Some(child.expect_str()?.to_string()),
            other => return Err(child.err(format!("unknown volume key \"{other}\""))),
        }
    }

    let backing = if external {
        if driver.is_some() {
            return Err(BerthError::parse(
                path.key("driver").as_str(),
                "an external volume cannot declare a driver",
            ));
        }
        VolumeBacking::External {
            name: external_name,
        }
    } else {
        VolumeBacking::Named { driver }
    };
    Ok(Volume { name, backing })
}
