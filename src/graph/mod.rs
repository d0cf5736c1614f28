// ABOUTME: Immutable service dependency graph validated for acyclicity at construction.
// ABOUTME: Provides ordering, level assignment, closures and reverse-edge queries.

mod error;
mod node;

pub use error::GraphError;
pub use node::{DEFAULT_MAX_RETRIES, DEFAULT_PROBE_TIMEOUT, DeploymentParams, ServiceNode};

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ServiceName;

/// Visitation marker for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Directed "depends-on" graph over services.
///
/// Built once from configuration and read-only afterwards. Construction
/// guarantees that every dependency resolves and that no cycle exists.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<ServiceName, ServiceNode>,
    dependents: BTreeMap<ServiceName, BTreeSet<ServiceName>>,
    order: Vec<ServiceName>,
}

impl DependencyGraph {
    /// Build and validate a graph.
    ///
    /// # Errors
    ///
    /// - `GraphError::DuplicateService` if a name appears twice
    /// - `GraphError::UnknownDependency` for a dangling dependency edge
    /// - `GraphError::Cycle` if any service is reachable from itself
    pub fn build<I>(nodes: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = ServiceNode>,
    {
        let mut map = BTreeMap::new();
        for node in nodes {
            if map.contains_key(&node.name) {
                return Err(GraphError::DuplicateService(node.name));
            }
            map.insert(node.name.clone(), node);
        }

        for node in map.values() {
            if let Some(missing) = node.dependencies.iter().find(|d| !map.contains_key(*d)) {
                return Err(GraphError::UnknownDependency {
                    service: node.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        detect_cycle(&map)?;

        let mut dependents: BTreeMap<ServiceName, BTreeSet<ServiceName>> = map
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();
        for node in map.values() {
            for dep in &node.dependencies {
                if let Some(set) = dependents.get_mut(dep) {
                    set.insert(node.name.clone());
                }
            }
        }

        let mut graph = Self {
            nodes: map,
            dependents,
            order: Vec::new(),
        };
        let all: BTreeSet<ServiceName> = graph.nodes.keys().cloned().collect();
        graph.order = graph.topological_order_within(&all);
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&ServiceNode> {
        self.nodes.get(name)
    }

    /// All service names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &ServiceName> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.values()
    }

    /// Direct dependencies of `name`, ascending.
    pub fn dependencies<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ServiceName> + use<'a> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|node| node.dependencies.iter())
    }

    /// Services that directly depend on `name`, ascending.
    pub fn dependents<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ServiceName> + use<'a> {
        self.dependents.get(name).into_iter().flatten()
    }

    /// Every service with a dependency path to `name`.
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<ServiceName> {
        self.reach(name, |graph, n| graph.dependents(n).cloned().collect())
    }

    /// Every service `name` depends on, directly or indirectly.
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<ServiceName> {
        self.reach(name, |graph, n| graph.dependencies(n).cloned().collect())
    }

    fn reach<F>(&self, start: &str, next: F) -> BTreeSet<ServiceName>
    where
        F: Fn(&Self, &str) -> Vec<ServiceName>,
    {
        let mut seen = BTreeSet::new();
        let mut stack = next(self, start);
        while let Some(name) = stack.pop() {
            if seen.insert(name.clone()) {
                stack.extend(next(self, name.as_str()));
            }
        }
        seen
    }

    /// The induced closure of `targets` plus all of their transitive
    /// dependencies, as a standalone graph.
    pub fn subgraph<'a, I>(&self, targets: I) -> Result<DependencyGraph, GraphError>
    where
        I: IntoIterator<Item = &'a ServiceName>,
    {
        let mut closure = BTreeSet::new();
        for target in targets {
            if !self.contains(target.as_str()) {
                return Err(GraphError::UnknownTarget(target.clone()));
            }
            closure.extend(self.transitive_dependencies(target.as_str()));
            closure.insert(target.clone());
        }

        DependencyGraph::build(
            closure
                .iter()
                .filter_map(|name| self.nodes.get(name))
                .cloned(),
        )
    }

    /// Topological order of the whole graph, ties broken by ascending name.
    pub fn topological_order(&self) -> &[ServiceName] {
        &self.order
    }

    /// Kahn's algorithm over the services in `subset`; edges leaving the
    /// subset are treated as already satisfied.
    pub fn topological_order_within(&self, subset: &BTreeSet<ServiceName>) -> Vec<ServiceName> {
        let mut in_degree: BTreeMap<&ServiceName, usize> = subset
            .iter()
            .filter(|name| self.contains(name.as_str()))
            .map(|name| {
                let degree = self
                    .dependencies(name.as_str())
                    .filter(|dep| subset.contains(*dep))
                    .count();
                (name, degree)
            })
            .collect();

        let mut ready: BTreeSet<&ServiceName> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(current) = ready.pop_first() {
            order.push(current.clone());
            for dependent in self.dependents(current.as_str()) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
        order
    }

    /// Level of every service in `subset`: 0 without in-subset dependencies,
    /// otherwise one more than the deepest in-subset dependency.
    pub fn levels_within(&self, subset: &BTreeSet<ServiceName>) -> BTreeMap<ServiceName, usize> {
        let mut levels = BTreeMap::new();
        for name in self.topological_order_within(subset) {
            let level = self
                .dependencies(name.as_str())
                .filter_map(|dep| levels.get(dep))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            levels.insert(name, level);
        }
        levels
    }

    pub fn levels(&self) -> BTreeMap<ServiceName, usize> {
        let all: BTreeSet<ServiceName> = self.nodes.keys().cloned().collect();
        self.levels_within(&all)
    }

    /// Number of services on the longest dependency chain.
    pub fn longest_chain(&self) -> usize {
        self.levels().values().max().map_or(0, |level| level + 1)
    }

    /// True when no service in `services` depends directly on another member.
    pub fn can_deploy_together(&self, services: &[ServiceName]) -> bool {
        let set: BTreeSet<&ServiceName> = services.iter().collect();
        services
            .iter()
            .all(|name| self.dependencies(name.as_str()).all(|dep| !set.contains(dep)))
    }
}

/// Iterative depth-first search with explicit in-progress markers.
///
/// Roots and edges are visited in ascending name order so the reported cycle
/// is the same on every run.
fn detect_cycle(nodes: &BTreeMap<ServiceName, ServiceNode>) -> Result<(), GraphError> {
    let mut marks: BTreeMap<&ServiceName, Mark> = BTreeMap::new();

    for root in nodes.keys() {
        if marks.contains_key(root) {
            continue;
        }

        // Each frame is a node plus the iterator over its remaining edges.
        let mut stack = vec![(root, nodes[root].dependencies.iter())];
        marks.insert(root, Mark::InProgress);

        while let Some((current, edges)) = stack.last_mut() {
            let current = *current;
            match edges.next() {
                Some(dep) => match marks.get(dep) {
                    Some(Mark::InProgress) => {
                        let start = stack
                            .iter()
                            .position(|(name, _)| *name == dep)
                            .unwrap_or(0);
                        let mut path: Vec<ServiceName> =
                            stack[start..].iter().map(|(name, _)| (*name).clone()).collect();
                        path.push(dep.clone());
                        return Err(GraphError::Cycle { path });
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(dep, Mark::InProgress);
                        stack.push((dep, nodes[dep].dependencies.iter()));
                    }
                },
                None => {
                    marks.insert(current, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}
