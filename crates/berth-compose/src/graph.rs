//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from `depends_on` declarations and resolves the
//! start order. Node indices follow declaration order, which is what breaks
//! ties between services that become ready at the same time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use berth_common::error::{BerthError, Result};
use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::model::Descriptor;

/// A dependency graph of services.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Edges point from a dependency to its dependent.
    graph: petgraph::Graph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: petgraph::Graph::new(),
            index: HashMap::new(),
        }
    }

    /// Builds the graph of a descriptor, adding services in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Reference`] if a dependency names an undeclared
    /// service.
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self> {
        let mut graph = Self::new();
        for service in &descriptor.services {
            let _ = graph.add_service(&service.name);
        }
        for service in &descriptor.services {
            let dependent = graph.add_service(&service.name);
            for dep in &service.depends_on {
                let dependency = graph.node(dep).ok_or_else(|| BerthError::Reference {
                    kind: "service",
                    name: dep.clone(),
                    referenced_by: format!("services.{}.depends_on", service.name),
                })?;
                graph.add_dependency(dependent, dependency);
            }
        }
        Ok(graph)
    }

    /// Adds a service node, returning the existing node if already present.
    pub fn add_service(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        let _ = self.index.insert(name, idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that a topological walk yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.update_edge(dependency, dependent, ());
    }

    /// Returns the node of a service.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    /// Returns the number of services in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph has no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the direct dependents of a service, in declaration order.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Returns the direct dependencies of a service, in declaration order.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(idx) = self.node(name) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// Returns a topological ordering of services for startup.
    ///
    /// Dependencies appear before the services that depend on them. Among
    /// services whose dependencies are all placed, the one declared first
    /// goes first.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Cycle`] naming the members of a cycle if the
    /// graph is not acyclic.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .count()
            })
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(self.graph[node].clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let members = self.cycle_members();
            tracing::warn!(?members, "dependency cycle detected");
            return Err(BerthError::Cycle { members });
        }

        tracing::debug!(?order, "start order resolved");
        Ok(order)
    }

    /// Returns the members of the first cycle (by declaration order), sorted
    /// in declaration order.
    fn cycle_members(&self) -> Vec<String> {
        let mut cycles: Vec<Vec<NodeIndex>> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&n| self.graph.contains_edge(n, n))
            })
            .map(|mut scc| {
                scc.sort_unstable();
                scc
            })
            .collect();
        cycles.sort_unstable_by_key(|scc| scc.first().copied());
        cycles
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|n| self.graph[n].clone())
            .collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Service;

    fn svc(name: &str, deps: &[&str]) -> Service {
        Service {
            name: name.into(),
            image: "img".into(),
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
            ..Service::default()
        }
    }

    fn descriptor(services: Vec<Service>) -> Descriptor {
        Descriptor {
            services,
            ..Descriptor::default()
        }
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = DependencyGraph::new();
        let order = graph.resolve_order().expect("should resolve");
        assert!(order.is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn single_node_resolves() {
        let mut graph = DependencyGraph::new();
        let _ = graph.add_service("api");
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["api"]);
    }

    #[test]
    fn foodgram_order() {
        let d = descriptor(vec![
            svc("db", &[]),
            svc("backend", &["db"]),
            svc("frontend", &["backend"]),
            svc("nginx", &["frontend", "backend"]),
        ]);
        let graph = DependencyGraph::from_descriptor(&d).expect("graph");
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["db", "backend", "frontend", "nginx"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let d = descriptor(vec![
            svc("nginx", &["frontend", "backend"]),
            svc("frontend", &[]),
            svc("cache", &[]),
            svc("backend", &["cache"]),
        ]);
        let graph = DependencyGraph::from_descriptor(&d).expect("graph");
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["frontend", "cache", "backend", "nginx"]);
    }

    #[test]
    fn independent_nodes_keep_declaration_order() {
        let mut graph = DependencyGraph::new();
        let _ = graph.add_service("z");
        let _ = graph.add_service("x");
        let _ = graph.add_service("y");
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["z", "x", "y"]);
    }

    #[test]
    fn diamond_dependency() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_service("a");
        let b = graph.add_service("b");
        let c = graph.add_service("c");
        let d = graph.add_service("d");
        graph.add_dependency(a, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, d);
        graph.add_dependency(c, d);

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn cycle_detection_names_members() {
        let d = descriptor(vec![
            svc("db", &["nginx"]),
            svc("backend", &["db"]),
            svc("frontend", &["backend"]),
            svc("nginx", &["frontend", "backend"]),
        ]);
        let graph = DependencyGraph::from_descriptor(&d).expect("graph");
        match graph.resolve_order().unwrap_err() {
            BerthError::Cycle { members } => {
                assert_eq!(members, vec!["db", "backend", "frontend", "nginx"]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn cycle_excludes_services_outside_it() {
        let d = descriptor(vec![
            svc("proxy", &["a"]),
            svc("a", &["b"]),
            svc("b", &["a"]),
            svc("worker", &[]),
        ]);
        let graph = DependencyGraph::from_descriptor(&d).expect("graph");
        match graph.resolve_order().unwrap_err() {
            BerthError::Cycle { members } => assert_eq!(members, vec!["a", "b"]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_service("a");
        graph.add_dependency(a, a);
        assert!(matches!(
            graph.resolve_order(),
            Err(BerthError::Cycle { members }) if members == vec!["a".to_string()]
        ));
    }

    #[test]
    fn unknown_dependency_is_reference_error() {
        let d = descriptor(vec![svc("backend", &["db"])]);
        let err = DependencyGraph::from_descriptor(&d).unwrap_err();
        assert!(
            matches!(&err, BerthError::Reference { name, .. } if name == "db"),
            "got: {err}"
        );
    }

    #[test]
    fn neighbours_in_declaration_order() {
        let d = descriptor(vec![
            svc("db", &[]),
            svc("backend", &["db"]),
            svc("frontend", &["backend"]),
            svc("nginx", &["frontend", "backend"]),
        ]);
        let graph = DependencyGraph::from_descriptor(&d).expect("graph");
        assert_eq!(graph.dependents("backend"), vec!["frontend", "nginx"]);
        assert_eq!(graph.dependencies("nginx"), vec!["backend", "frontend"]);
        assert!(graph.dependencies("db").is_empty());
        assert!(graph.dependents("missing").is_empty());
    }
}
