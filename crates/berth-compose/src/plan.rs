//! Execution plan: a validated descriptor plus its resolved start order.

use berth_common::error::Result;

use crate::graph::DependencyGraph;
use crate::model::{Descriptor, Service};

/// A descriptor whose dependency graph has been resolved.
///
/// Read-only once built; the supervisor shares it across tasks.
#[derive(Debug)]
pub struct Plan {
    descriptor: Descriptor,
    graph: DependencyGraph,
    order: Vec<String>,
}

impl Plan {
    /// Resolves the start order of a validated descriptor.
    ///
    /// # Errors
    ///
    /// Returns a reference error for unknown dependencies or a cycle error
    /// if the dependency graph is not acyclic.
    pub fn new(descriptor: Descriptor) -> Result<Self> {
        let graph = DependencyGraph::from_descriptor(&descriptor)?;
        let order = graph.resolve_order()?;
        tracing::info!(?order, "execution plan resolved");
        Ok(Self {
            descriptor,
            graph,
            order,
        })
    }

    /// Returns the underlying descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Returns service names in start order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Returns service names in shutdown order (reverse of start order).
    pub fn shutdown_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().rev().map(String::as_str)
    }

    /// Returns services in start order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.order
            .iter()
            .filter_map(|name| self.descriptor.service(name))
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.descriptor.service(name)
    }

    /// Returns the direct dependencies of a service.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.graph.dependencies(name)
    }

    /// Returns the direct dependents of a service.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.graph.dependents(name)
    }
}
