// ABOUTME: Error types for dependency graph construction and queries.
// ABOUTME: Cycles and dangling references are rejected before any plan exists.

use crate::types::ServiceName;

/// Errors raised while building or querying a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A service declares a dependency that is not defined.
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    /// A service is reachable from itself through dependency edges.
    #[error("dependency cycle detected: {}", format_cycle(.path))]
    Cycle { path: Vec<ServiceName> },

    /// The same service name appears twice in the input.
    #[error("service '{0}' is defined more than once")]
    DuplicateService(ServiceName),

    /// A requested target is not part of the graph.
    #[error("unknown target service '{0}'")]
    UnknownTarget(ServiceName),
}

fn format_cycle(path: &[ServiceName]) -> String {
    path.iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
