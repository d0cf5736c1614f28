// ABOUTME: The execution record: per-service state table, ordering history and verdict.
// ABOUTME: Owned by one engine loop while running; read-only once terminal.

mod store;

pub use store::{ExecutionStore, ListFilter, StoreError};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::ServiceState;
use crate::plan::{DeploymentPlan, Strategy};
use crate::types::{ExecutionId, ServiceName};

/// Outcome of an execution as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        self != Verdict::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Running => "running",
            Verdict::Succeeded => "succeeded",
            Verdict::Failed => "failed",
            Verdict::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub state: ServiceState,
    /// Attempts started so far (deploy and probe failures share the budget).
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub rollback_error: Option<String>,
}

impl ServiceRecord {
    fn pending() -> Self {
        Self {
            state: ServiceState::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
            rollback_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("service '{0}' is not part of this execution")]
    UnknownService(ServiceName),

    #[error("illegal transition for '{service}': {from} -> {to}")]
    Illegal {
        service: ServiceName,
        from: ServiceState,
        to: ServiceState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub strategy: Strategy,
    pub environment: String,
    pub version: String,
    /// Services deployed by this execution, in plan order.
    pub targets: Vec<ServiceName>,
    /// Dependencies outside the target set, verified healthy at submission.
    #[serde(default)]
    pub pre_satisfied: Vec<ServiceName>,
    pub concurrency_limit: usize,
    pub plan: DeploymentPlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub services: BTreeMap<ServiceName, ServiceRecord>,
    #[serde(default)]
    pub admission_order: Vec<ServiceName>,
    #[serde(default)]
    pub rollback_order: Vec<ServiceName>,
    pub verdict: Verdict,
}

impl Execution {
    pub fn new(
        id: ExecutionId,
        plan: DeploymentPlan,
        environment: impl Into<String>,
        version: impl Into<String>,
        concurrency_limit: usize,
    ) -> Self {
        let targets: Vec<ServiceName> = plan.services().cloned().collect();
        let services = targets
            .iter()
            .map(|name| (name.clone(), ServiceRecord::pending()))
            .collect();
        Self {
            id,
            strategy: plan.strategy(),
            environment: environment.into(),
            version: version.into(),
            targets,
            pre_satisfied: Vec::new(),
            concurrency_limit,
            plan,
            started_at: Utc::now(),
            finished_at: None,
            services,
            admission_order: Vec::new(),
            rollback_order: Vec::new(),
            verdict: Verdict::Running,
        }
    }

    pub fn with_pre_satisfied(mut self, services: BTreeSet<ServiceName>) -> Self {
        self.pre_satisfied = services.into_iter().collect();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.verdict.is_terminal()
    }

    pub fn state(&self, service: &str) -> Option<ServiceState> {
        self.services.get(service).map(|r| r.state)
    }

    pub fn record(&self, service: &str) -> Option<&ServiceRecord> {
        self.services.get(service)
    }

    pub(crate) fn record_mut(&mut self, service: &str) -> Option<&mut ServiceRecord> {
        self.services.get_mut(service)
    }

    pub fn count(&self, state: ServiceState) -> usize {
        self.services.values().filter(|r| r.state == state).count()
    }

    pub fn active_count(&self) -> usize {
        self.services.values().filter(|r| r.state.is_active()).count()
    }

    /// Services currently in `state`, in plan order.
    pub fn in_state(&self, state: ServiceState) -> Vec<ServiceName> {
        self.targets
            .iter()
            .filter(|name| self.state(name.as_str()) == Some(state))
            .cloned()
            .collect()
    }

    /// Move `service` to `to`, stamping start and finish times.
    pub fn transition(&mut self, service: &ServiceName, to: ServiceState) -> Result<(), TransitionError> {
        let record = self
            .services
            .get_mut(service.as_str())
            .ok_or_else(|| TransitionError::UnknownService(service.clone()))?;

        if !record.state.can_transition_to(to) {
            return Err(TransitionError::Illegal {
                service: service.clone(),
                from: record.state,
                to,
            });
        }

        let now = Utc::now();
        match to {
            ServiceState::Deploying => record.started_at = Some(now),
            ServiceState::Healthy
            | ServiceState::Failed
            | ServiceState::RolledBack
            | ServiceState::Skipped => record.finished_at = Some(now),
            _ => {}
        }
        record.state = to;
        Ok(())
    }

    /// Seal the execution with its verdict.
    pub fn finish(&mut self, verdict: Verdict) {
        self.verdict = verdict;
        self.finished_at = Some(Utc::now());
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            id: self.id.clone(),
            strategy: self.strategy,
            environment: self.environment.clone(),
            version: self.version.clone(),
            verdict: self.verdict,
            started_at: self.started_at,
            finished_at: self.finished_at,
            services: self.services.len(),
            healthy: self.count(ServiceState::Healthy),
            failed: self.count(ServiceState::Failed),
            skipped: self.count(ServiceState::Skipped),
            rolled_back: self.count(ServiceState::RolledBack),
        }
    }

    /// One row per service, in plan order.
    pub fn state_table(&self) -> Vec<StateRow> {
        self.targets
            .iter()
            .filter_map(|name| {
                let record = self.services.get(name.as_str())?;
                Some(StateRow {
                    service: name.clone(),
                    wave: self.plan.wave_index(name.as_str()).map(|w| w + 1).unwrap_or(0),
                    state: record.state,
                    attempts: record.attempts,
                    last_error: record.last_error.clone(),
                    rollback_error: record.rollback_error.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub id: ExecutionId,
    pub strategy: Strategy,
    pub environment: String,
    pub version: String,
    pub verdict: Verdict,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub services: usize,
    pub healthy: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateRow {
    pub service: ServiceName,
    /// 1-based wave number.
    pub wave: usize,
    pub state: ServiceState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DependencyGraph, ServiceNode};
    use crate::plan::build_plan;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).unwrap()
    }

    fn execution() -> Execution {
        let graph = DependencyGraph::build([
            ServiceNode::new(name("db")),
            ServiceNode::new(name("api")).depends_on([name("db")]),
        ])
        .unwrap();
        let plan = build_plan(&graph, Strategy::ParallelOptimized, &[]).unwrap();
        Execution::new(ExecutionId::new("exec-1"), plan, "staging", "2.0.0", 2)
    }

    #[test]
    fn starts_with_every_target_pending() {
        let execution = execution();
        assert_eq!(execution.targets, vec![name("db"), name("api")]);
        assert_eq!(execution.count(ServiceState::Pending), 2);
        assert_eq!(execution.verdict, Verdict::Running);
        assert!(!execution.is_terminal());
    }

    #[test]
    fn transition_stamps_times() {
        let mut execution = execution();
        execution.transition(&name("db"), ServiceState::Deploying).unwrap();
        assert!(execution.record("db").unwrap().started_at.is_some());
        execution.transition(&name("db"), ServiceState::HealthChecking).unwrap();
        execution.transition(&name("db"), ServiceState::Healthy).unwrap();
        assert!(execution.record("db").unwrap().finished_at.is_some());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut execution = execution();
        let err = execution
            .transition(&name("api"), ServiceState::Healthy)
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                service: name("api"),
                from: ServiceState::Pending,
                to: ServiceState::Healthy,
            }
        );
        assert_eq!(execution.state("api"), Some(ServiceState::Pending));
    }

    #[test]
    fn state_table_follows_plan_order() {
        let execution = execution();
        let rows = execution.state_table();
        assert_eq!(rows[0].service, name("db"));
        assert_eq!(rows[0].wave, 1);
        assert_eq!(rows[1].wave, 2);
    }

    #[test]
    fn round_trips_through_json() {
        let mut execution = execution();
        execution.finish(Verdict::Stopped);
        let json = serde_json::to_string(&execution).unwrap();
        let back: Execution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, execution);
        assert_eq!(back.summary().verdict, Verdict::Stopped);
    }
}
