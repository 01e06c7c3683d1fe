//! # berth-compose
//!
//! Loader for compose-style deployment descriptors.
//!
//! Handles:
//! - **Parser**: YAML structure walk and semantic validation of descriptors.
//! - **Model**: Service, volume, mount and port records.
//! - **Graph**: Dependency graph construction and topological resolution.
//! - **Plan**: A validated descriptor together with its start order.

#![cfg_attr(
    test,
    allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)
)]

pub mod graph;
pub mod model;
pub mod parser;
pub mod plan;

use std::path::Path;

use berth_common::error::Result;

pub use model::{Descriptor, Service, Volume};
pub use plan::Plan;

/// Parses, validates and plans a descriptor from its source text.
///
/// # Errors
///
/// Returns the first parse, reference or cycle error encountered.
pub fn load_str(input: &str) -> Result<Plan> {
    Plan::new(parser::parse_descriptor(input)?)
}

/// Reads, parses, validates and plans a descriptor file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, otherwise the errors of
/// [`load_str`].
pub fn load_file(path: &Path) -> Result<Plan> {
    Plan::new(parser::parse_file(path)?)
}
