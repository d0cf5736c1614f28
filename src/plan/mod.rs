// ABOUTME: Deployment plan: ordered waves of services computed from the graph and a strategy.
// ABOUTME: Plans are pure data, recomputed per request and never mutated.

mod strategy;

pub use strategy::{AdmissionMode, PlanFn, Strategy, UnknownStrategy};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::types::ServiceName;

/// Errors that reject a plan request before execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("unknown target service '{0}'")]
    UnknownTarget(ServiceName),

    #[error("nothing to deploy: the dependency graph is empty")]
    EmptyGraph,
}

/// A set of services admissible to start together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wave(NonEmpty<ServiceName>);

impl Wave {
    pub fn new(services: NonEmpty<ServiceName>) -> Self {
        Self(services)
    }

    /// Members in admission order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|member| member.as_str() == name)
    }
}

/// Ordered sequence of waves for one deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    strategy: Strategy,
    waves: Vec<Wave>,
}

/// Build a plan for `targets` (the whole graph when `targets` is empty).
///
/// Dependencies of a target that are not themselves targets do not get a
/// wave; the caller is responsible for ensuring they are already healthy.
///
/// # Errors
///
/// Returns `PlanError::UnknownTarget` if a target is not in the graph and
/// `PlanError::EmptyGraph` if there is nothing to plan.
pub fn build_plan(
    graph: &DependencyGraph,
    strategy: Strategy,
    targets: &[ServiceName],
) -> Result<DeploymentPlan, PlanError> {
    if let Some(unknown) = targets.iter().find(|t| !graph.contains(t.as_str())) {
        return Err(PlanError::UnknownTarget(unknown.clone()));
    }

    let selected: BTreeSet<ServiceName> = if targets.is_empty() {
        graph.names().cloned().collect()
    } else {
        targets.iter().cloned().collect()
    };
    if selected.is_empty() {
        return Err(PlanError::EmptyGraph);
    }

    let waves = (strategy.planner())(graph, &selected);
    tracing::debug!(%strategy, waves = waves.len(), services = selected.len(), "built deployment plan");

    Ok(DeploymentPlan { strategy, waves })
}

impl DeploymentPlan {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn admission(&self) -> AdmissionMode {
        self.strategy.admission()
    }

    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Number of services in the plan.
    pub fn len(&self) -> usize {
        self.waves.iter().map(Wave::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.waves.iter().any(|wave| wave.contains(name))
    }

    /// Zero-based wave index of `name`.
    pub fn wave_index(&self, name: &str) -> Option<usize> {
        self.waves.iter().position(|wave| wave.contains(name))
    }

    /// All services, wave by wave, in admission order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
        self.waves.iter().flat_map(Wave::services)
    }

    /// Check the wave invariant against `graph`: every service appears once and
    /// each in-plan dependency sits in a strictly earlier wave.
    pub fn verify(&self, graph: &DependencyGraph) -> bool {
        let mut index: BTreeMap<&ServiceName, usize> = BTreeMap::new();
        for (i, wave) in self.waves.iter().enumerate() {
            for name in wave.services() {
                if index.insert(name, i).is_some() {
                    return false;
                }
            }
        }

        index.iter().all(|(name, wave)| {
            graph
                .dependencies(name.as_str())
                .filter_map(|dep| index.get(dep))
                .all(|dep_wave| dep_wave < wave)
        })
    }
}

impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Deployment plan ({}): {} wave(s), {} service(s)",
            self.strategy,
            self.waves.len(),
            self.len()
        )?;
        self.write_waves(f, None)
    }
}

impl DeploymentPlan {
    /// Whether every in-plan dependency of wave `index` sits in an earlier wave.
    pub fn wave_dependencies_ok(&self, index: usize, graph: &DependencyGraph) -> bool {
        let Some(wave) = self.waves.get(index) else {
            return false;
        };
        wave.services().all(|name| {
            graph
                .dependencies(name.as_str())
                .filter_map(|dep| self.wave_index(dep.as_str()))
                .all(|dep_wave| dep_wave < index)
        })
    }

    /// Annotate the plan with the effective concurrency and per-wave checks.
    pub fn report(&self, graph: &DependencyGraph, max_concurrent: usize) -> PlanReport<'_> {
        PlanReport {
            plan: self,
            max_concurrent,
            dependencies_ok: (0..self.waves.len())
                .map(|i| self.wave_dependencies_ok(i, graph))
                .collect(),
        }
    }

    fn write_waves(&self, f: &mut fmt::Formatter<'_>, checks: Option<&[bool]>) -> fmt::Result {
        for (i, wave) in self.waves.iter().enumerate() {
            let members: Vec<&str> = wave.services().map(ServiceName::as_str).collect();
            write!(f, "  Wave {}: {}", i + 1, members.join(", "))?;
            match checks.and_then(|c| c.get(i)) {
                Some(true) => writeln!(f, " [dependencies OK]")?,
                Some(false) => writeln!(f, " [dependencies NOT satisfied]")?,
                None => writeln!(f)?,
            }
        }
        if self.admission() == AdmissionMode::DependencyReady {
            writeln!(
                f,
                "  (waves are advisory; services start once their dependencies are healthy)"
            )?;
        }
        Ok(())
    }
}

/// A plan as shown to operators: the waves plus the concurrency bound that
/// would apply and whether each wave's dependencies are satisfied.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport<'a> {
    #[serde(flatten)]
    plan: &'a DeploymentPlan,
    pub max_concurrent: usize,
    pub dependencies_ok: Vec<bool>,
}

impl PlanReport<'_> {
    pub fn plan(&self) -> &DeploymentPlan {
        self.plan
    }
}

impl fmt::Display for PlanReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Deployment plan ({}): {} wave(s), {} service(s), max {} concurrent",
            self.plan.strategy,
            self.plan.waves.len(),
            self.plan.len(),
            self.max_concurrent
        )?;
        self.plan.write_waves(f, Some(&self.dependencies_ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ServiceNode;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).unwrap()
    }

    fn diamond() -> DependencyGraph {
        DependencyGraph::build([
            ServiceNode::new(name("A")),
            ServiceNode::new(name("B")).depends_on([name("A")]),
            ServiceNode::new(name("C")).depends_on([name("A")]),
            ServiceNode::new(name("D")).depends_on([name("B"), name("C")]),
        ])
        .unwrap()
    }

    fn wave_names(plan: &DeploymentPlan) -> Vec<Vec<String>> {
        plan.waves()
            .iter()
            .map(|w| w.services().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn parallel_optimized_batches_by_level() {
        let plan = build_plan(&diamond(), Strategy::ParallelOptimized, &[]).unwrap();
        assert_eq!(wave_names(&plan), [vec!["A"], vec!["B", "C"], vec!["D"]]);
        assert_eq!(plan.wave_index("C"), Some(1));
    }

    #[test]
    fn sequential_is_one_per_wave() {
        let plan = build_plan(&diamond(), Strategy::Sequential, &[]).unwrap();
        let order: Vec<_> = plan.services().map(|s| s.to_string()).collect();
        assert_eq!(order, ["A", "B", "C", "D"]);
        assert!(plan.waves().iter().all(|w| w.len() == 1));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = build_plan(&diamond(), Strategy::Sequential, &[name("Z")]).unwrap_err();
        assert_eq!(err, PlanError::UnknownTarget(name("Z")));
    }

    #[test]
    fn empty_graph_is_rejected() {
        let graph = DependencyGraph::build(Vec::new()).unwrap();
        let err = build_plan(&graph, Strategy::Sequential, &[]).unwrap_err();
        assert_eq!(err, PlanError::EmptyGraph);
    }

    #[test]
    fn subset_plans_treat_outside_dependencies_as_satisfied() {
        let plan =
            build_plan(&diamond(), Strategy::ParallelOptimized, &[name("B"), name("D")]).unwrap();
        assert_eq!(wave_names(&plan), [vec!["B"], vec!["D"]]);
    }

    #[test]
    fn verify_detects_misordered_waves() {
        let graph = diamond();
        let plan = DeploymentPlan {
            strategy: Strategy::ParallelOptimized,
            waves: vec![
                Wave::new(NonEmpty::new(name("B"))),
                Wave::new(NonEmpty::new(name("A"))),
            ],
        };
        assert!(!plan.verify(&graph));
        let good = build_plan(&graph, Strategy::PriorityBased, &[]).unwrap();
        assert!(good.verify(&graph));
    }

    #[test]
    fn display_lists_waves() {
        let plan = build_plan(&diamond(), Strategy::ParallelOptimized, &[]).unwrap();
        let text = plan.to_string();
        assert!(text.contains("3 wave(s), 4 service(s)"));
        assert!(text.contains("Wave 2: B, C"));
    }

    #[test]
    fn report_shows_limit_and_wave_checks() {
        let graph = diamond();
        let plan = build_plan(&graph, Strategy::ParallelOptimized, &[]).unwrap();
        let report = plan.report(&graph, 3);
        assert_eq!(report.dependencies_ok, [true, true, true]);
        let text = report.to_string();
        assert!(text.contains("max 3 concurrent"));
        assert!(text.contains("Wave 2: B, C [dependencies OK]"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "parallel_optimized");
        assert_eq!(json["max_concurrent"], 3);
        assert_eq!(json["dependencies_ok"], serde_json::json!([true, true, true]));
    }

    #[test]
    fn report_flags_misordered_wave() {
        let graph = diamond();
        let plan = DeploymentPlan {
            strategy: Strategy::ParallelOptimized,
            waves: vec![
                Wave::new(NonEmpty::new(name("B"))),
                Wave::new(NonEmpty::new(name("A"))),
            ],
        };
        let report = plan.report(&graph, 1);
        assert_eq!(report.dependencies_ok, [false, true]);
        assert!(report.to_string().contains("Wave 1: B [dependencies NOT satisfied]"));
    }
}
