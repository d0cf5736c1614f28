// ABOUTME: Execution engine: admits services under the plan's rules and a concurrency bound.
// ABOUTME: One coordinating loop owns the execution; spawned workers report back over a channel.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::execution::{Execution, Verdict};
use crate::graph::DependencyGraph;
use crate::ops::{Deployer, HealthProber, Release};
use crate::plan::AdmissionMode;
use crate::types::ServiceName;

use super::rollback::rollback;
use super::worker::{Worker, WorkerReport};
use super::{CancelSignal, Reporter, RetryPolicy, ServiceFailure, ServiceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on services in `Deploying` or `HealthChecking` at once.
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Engine {
    graph: Arc<DependencyGraph>,
    deployer: Arc<dyn Deployer>,
    prober: Arc<dyn HealthProber>,
    settings: EngineSettings,
    cancel: CancelSignal,
    reporter: Reporter,
}

impl Engine {
    pub fn new(
        graph: Arc<DependencyGraph>,
        deployer: Arc<dyn Deployer>,
        prober: Arc<dyn HealthProber>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            graph,
            deployer,
            prober,
            settings,
            cancel: CancelSignal::new(),
            reporter: Reporter::detached(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Run the execution to a terminal verdict, rolling back if anything failed or a stop was seen.
    pub async fn execute(&self, mut execution: Execution) -> Execution {
        let limit = self.settings.concurrency_limit.max(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stop_observed = false;

        tracing::info!(
            execution = %execution.id,
            strategy = %execution.strategy,
            services = execution.targets.len(),
            limit,
            "starting execution"
        );
        self.reporter.execution_started(&execution);

        loop {
            if self.cancel.is_cancelled() {
                // Any unsettled service means the stop landed mid-execution.
                stop_observed |= execution.count(ServiceState::Pending) > 0
                    || execution.active_count() > 0;
            } else {
                for service in self.admissible(&execution, limit) {
                    self.admit(&mut execution, &service, &tx);
                }
            }

            if execution.active_count() == 0 {
                break;
            }
            let Some(report) = rx.recv().await else {
                break;
            };
            if let WorkerReport::Finished {
                outcome: Err(ref failure),
                ..
            } = report
            {
                stop_observed |= failure.is_stop();
            }
            self.apply(&mut execution, report);
        }

        let leftover = execution.in_state(ServiceState::Pending);
        if !leftover.is_empty() {
            let reason = if stop_observed {
                "execution stopped before admission".to_string()
            } else {
                "never became admissible".to_string()
            };
            for service in &leftover {
                self.skip(&mut execution, service, reason.clone());
            }
        }

        let failed = execution.count(ServiceState::Failed) > 0;
        if failed || stop_observed {
            let report = rollback(&mut execution, &self.graph, &*self.deployer, &self.reporter).await;
            if !report.is_clean() {
                tracing::warn!(
                    execution = %execution.id,
                    failed = report.failed.len(),
                    "rollback completed with errors"
                );
            }
        }

        let verdict = if stop_observed {
            Verdict::Stopped
        } else if execution.count(ServiceState::Healthy) == execution.targets.len() {
            Verdict::Succeeded
        } else {
            Verdict::Failed
        };
        execution.finish(verdict);
        tracing::info!(execution = %execution.id, %verdict, "execution finished");
        self.reporter.execution_finished(&execution);

        execution
    }

    /// Services to admit now, in admission order, at most the free slots.
    fn admissible(&self, execution: &Execution, limit: usize) -> Vec<ServiceName> {
        let slots = limit.saturating_sub(execution.active_count());
        if slots == 0 {
            return Vec::new();
        }

        let plan = &execution.plan;
        let ready = |name: &ServiceName| {
            execution.state(name.as_str()) == Some(ServiceState::Pending)
                && self
                    .graph
                    .dependencies(name.as_str())
                    .filter(|dep| plan.contains(dep.as_str()))
                    .all(|dep| execution.state(dep.as_str()) == Some(ServiceState::Healthy))
        };

        let mut candidates: Vec<ServiceName> = match plan.admission() {
            AdmissionMode::WaveBarrier => {
                let mut candidates = Vec::new();
                for wave in plan.waves() {
                    candidates.extend(wave.services().filter(|s| ready(s)).cloned());
                    let settled = wave.services().all(|s| {
                        execution
                            .state(s.as_str())
                            .is_some_and(ServiceState::is_settled)
                    });
                    if !settled {
                        break;
                    }
                }
                candidates
            }
            AdmissionMode::DependencyReady => {
                let mut candidates: Vec<ServiceName> =
                    plan.services().filter(|s| ready(s)).cloned().collect();
                candidates.sort_by_key(|name| {
                    let priority = self
                        .graph
                        .node(name.as_str())
                        .map(|n| n.priority)
                        .unwrap_or_default();
                    (Reverse(priority), plan.wave_index(name.as_str()), name.clone())
                });
                candidates
            }
        };

        candidates.truncate(slots);
        candidates
    }

    fn admit(
        &self,
        execution: &mut Execution,
        service: &ServiceName,
        reports: &mpsc::UnboundedSender<WorkerReport>,
    ) {
        let Some(node) = self.graph.node(service.as_str()) else {
            self.skip(execution, service, "not present in the dependency graph".to_string());
            return;
        };
        if let Err(e) = execution.transition(service, ServiceState::Deploying) {
            tracing::error!("{}", e);
            return;
        }
        execution.admission_order.push(service.clone());
        if let Some(record) = execution.record_mut(service.as_str()) {
            record.attempts = 1;
        }
        tracing::debug!(service = %service, "admitted");
        self.reporter.state_changed(execution, service);

        Worker {
            release: Release::new(node, &execution.id, &execution.environment, &execution.version),
            deployer: self.deployer.clone(),
            prober: self.prober.clone(),
            retry: self.settings.retry,
            cancel: self.cancel.clone(),
        }
        .spawn(reports.clone());
    }

    fn apply(&self, execution: &mut Execution, report: WorkerReport) {
        match report {
            WorkerReport::Probing { service } => {
                self.move_to(execution, &service, ServiceState::HealthChecking);
            }
            WorkerReport::Retrying {
                service,
                attempt,
                error,
                ..
            } => {
                if let Some(record) = execution.record_mut(service.as_str()) {
                    record.attempts = attempt + 1;
                    record.last_error = Some(error);
                }
                self.reporter.publish(execution);
            }
            WorkerReport::Finished {
                service,
                outcome: Ok(attempts),
            } => {
                if let Some(record) = execution.record_mut(service.as_str()) {
                    record.attempts = attempts;
                }
                self.move_to(execution, &service, ServiceState::Healthy);
            }
            WorkerReport::Finished {
                service,
                outcome: Err(failure),
            } => self.fail(execution, &service, failure),
        }
    }

    fn fail(&self, execution: &mut Execution, service: &ServiceName, failure: ServiceFailure) {
        tracing::warn!(service = %service, "service failed: {}", failure);
        if let Some(record) = execution.record_mut(service.as_str()) {
            if let Some(attempts) = failure.attempts() {
                record.attempts = attempts;
            }
            record.last_error = Some(failure.to_string());
        }
        self.move_to(execution, service, ServiceState::Failed);

        let dependents: BTreeSet<ServiceName> = self.graph.transitive_dependents(service.as_str());
        for dependent in execution.targets.clone() {
            if dependents.contains(&dependent)
                && execution.state(dependent.as_str()) == Some(ServiceState::Pending)
            {
                self.skip(execution, &dependent, format!("dependency '{service}' failed"));
            }
        }
    }

    fn skip(&self, execution: &mut Execution, service: &ServiceName, reason: String) {
        if let Some(record) = execution.record_mut(service.as_str()) {
            record.last_error = Some(reason);
        }
        self.move_to(execution, service, ServiceState::Skipped);
    }

    fn move_to(&self, execution: &mut Execution, service: &ServiceName, state: ServiceState) {
        match execution.transition(service, state) {
            Ok(()) => {
                tracing::info!(service = %service, %state, "state changed");
                self.reporter.state_changed(execution, service);
            }
            Err(e) => tracing::error!("{}", e),
        }
    }
}
