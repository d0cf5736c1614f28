// ABOUTME: Deployment strategy selection and the per-strategy wave builders.
// ABOUTME: The closed strategy set resolves to a plan function through a dispatch table.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

use super::Wave;
use crate::graph::DependencyGraph;
use crate::types::ServiceName;

/// Signature shared by every wave builder.
pub type PlanFn = fn(&DependencyGraph, &BTreeSet<ServiceName>) -> Vec<Wave>;

/// Strategy for ordering a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Strategy {
    /// One service per wave in dependency order. Lowest throughput, used as a
    /// correctness baseline.
    Sequential,

    /// Level batching: every service at the same dependency depth shares a
    /// wave. Produces the minimum number of waves.
    ParallelOptimized,

    /// Same waves as `ParallelOptimized`, ordered by descending priority.
    /// Waves are advisory: a service may start as soon as its own
    /// dependencies are healthy.
    PriorityBased,
}

/// How the engine treats wave boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// A wave starts only after every earlier wave has settled.
    WaveBarrier,
    /// A service starts once its direct dependencies are healthy.
    DependencyReady,
}

const PLANNERS: [(Strategy, PlanFn); 3] = [
    (Strategy::Sequential, sequential),
    (Strategy::ParallelOptimized, parallel_optimized),
    (Strategy::PriorityBased, priority_based),
];

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Sequential,
        Strategy::ParallelOptimized,
        Strategy::PriorityBased,
    ];

    /// Wave builder for this strategy.
    pub fn planner(self) -> PlanFn {
        PLANNERS
            .iter()
            .find(|(strategy, _)| *strategy == self)
            .map(|(_, planner)| *planner)
            .unwrap_or(sequential)
    }

    pub fn admission(self) -> AdmissionMode {
        match self {
            Strategy::Sequential | Strategy::ParallelOptimized => AdmissionMode::WaveBarrier,
            Strategy::PriorityBased => AdmissionMode::DependencyReady,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::ParallelOptimized => "parallel_optimized",
            Strategy::PriorityBased => "priority_based",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deployment strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

fn sequential(graph: &DependencyGraph, targets: &BTreeSet<ServiceName>) -> Vec<Wave> {
    graph
        .topological_order_within(targets)
        .into_iter()
        .map(|name| Wave::new(NonEmpty::new(name)))
        .collect()
}

fn by_level(graph: &DependencyGraph, targets: &BTreeSet<ServiceName>) -> Vec<Vec<ServiceName>> {
    let mut buckets: BTreeMap<usize, Vec<ServiceName>> = BTreeMap::new();
    for (name, level) in graph.levels_within(targets) {
        buckets.entry(level).or_default().push(name);
    }
    buckets.into_values().collect()
}

fn parallel_optimized(graph: &DependencyGraph, targets: &BTreeSet<ServiceName>) -> Vec<Wave> {
    by_level(graph, targets)
        .into_iter()
        .filter_map(|members| NonEmpty::from_vec(members).map(Wave::new))
        .collect()
}

fn priority_based(graph: &DependencyGraph, targets: &BTreeSet<ServiceName>) -> Vec<Wave> {
    by_level(graph, targets)
        .into_iter()
        .filter_map(|mut members| {
            // Stable sort keeps ascending-name order among equal priorities.
            members.sort_by_key(|name| {
                Reverse(graph.node(name.as_str()).map_or(0, |node| node.priority))
            });
            NonEmpty::from_vec(members).map(Wave::new)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_names() {
        assert_eq!("sequential".parse::<Strategy>(), Ok(Strategy::Sequential));
        assert_eq!(
            "parallel_optimized".parse::<Strategy>(),
            Ok(Strategy::ParallelOptimized)
        );
        assert_eq!(
            "priority_based".parse::<Strategy>(),
            Ok(Strategy::PriorityBased)
        );
        assert!("canary".parse::<Strategy>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>(), Ok(strategy));
        }
    }

    #[test]
    fn only_priority_based_crosses_waves() {
        assert_eq!(Strategy::Sequential.admission(), AdmissionMode::WaveBarrier);
        assert_eq!(
            Strategy::ParallelOptimized.admission(),
            AdmissionMode::WaveBarrier
        );
        assert_eq!(
            Strategy::PriorityBased.admission(),
            AdmissionMode::DependencyReady
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Strategy::ParallelOptimized).unwrap();
        assert_eq!(json, "\"parallel_optimized\"");
    }
}
