//! Unified error types for the berth workspace.
//!
//! Load-time failures come in three fatal kinds: [`BerthError::Parse`] for a
//! malformed descriptor, [`BerthError::Reference`] for a dangling service or
//! volume reference, and [`BerthError::Cycle`] for circular dependencies.
//! None of them is recoverable; deployment does not proceed.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BerthError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The descriptor is malformed.
    #[error("parse error at `{key}`: {message}")]
    Parse {
        /// Dotted path of the offending key, e.g. `services.db.restart`.
        key: String,
        /// What is wrong with the value at that key.
        message: String,
    },

    /// A service references an undeclared service or volume.
    #[error("{referenced_by} references unknown {kind} \"{name}\"")]
    Reference {
        /// Type of the missing target (`service` or `volume`).
        kind: &'static str,
        /// Name that failed to resolve.
        name: String,
        /// Key path of the reference, e.g. `services.nginx.depends_on`.
        referenced_by: String,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency between services: {}", members.join(", "))]
    Cycle {
        /// Services taking part in the cycle, in declaration order.
        members: Vec<String>,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The service backend failed to carry out an operation.
    #[error("backend error for {service}: {message}")]
    Backend {
        /// Service (or project resource) the operation was for.
        service: String,
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BerthError {
    /// Builds a [`BerthError::Parse`] for the given key path.
    pub fn parse(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Builds a [`BerthError::Backend`] for the given service.
    pub fn backend(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns whether this error is one of the fatal load-time kinds.
    #[must_use]
    pub const fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Reference { .. } | Self::Cycle { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;
