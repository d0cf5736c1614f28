// ABOUTME: Public entry point: submit deployments, query and stop executions, probe environments.
// ABOUTME: Validates requests, builds plans, and runs each execution on its own task.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::ExecutionSettings;
use crate::deploy::{CancelSignal, Engine, EngineSettings, Reporter};
use crate::execution::{Execution, ExecutionStore, ExecutionSummary, ListFilter};
use crate::graph::{DependencyGraph, GraphError};
use crate::ops::{
    Deployer, HealthProber, HealthStatus, NotificationDispatcher, Notifier, Release,
};
use crate::plan::{DeploymentPlan, PlanError, Strategy, build_plan};
use crate::types::{ExecutionId, ServiceName};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid dependency graph: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid deployment plan: {0}")]
    Plan(#[from] PlanError),

    #[error("'{service}' depends on '{dependency}', which is not healthy in this environment: {reason}")]
    UnsatisfiedDependency {
        service: ServiceName,
        dependency: ServiceName,
        reason: String,
    },

    #[error("unknown execution '{0}'")]
    UnknownExecution(ExecutionId),

    #[error("concurrency limit must be at least 1 (got {0})")]
    InvalidConcurrency(usize),
}

/// What to deploy and where.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub strategy: Strategy,
    pub environment: String,
    pub version: String,
    /// Empty means every service in the graph.
    pub targets: Vec<ServiceName>,
    pub concurrency_limit: Option<usize>,
    /// Deploy the targets' transitive dependencies too instead of requiring them healthy.
    pub include_dependencies: bool,
}

impl DeploymentRequest {
    pub fn new(strategy: Strategy, environment: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            strategy,
            environment: environment.into(),
            version: version.into(),
            targets: Vec::new(),
            concurrency_limit: None,
            include_dependencies: false,
        }
    }

    pub fn targets<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = ServiceName>,
    {
        self.targets = targets.into_iter().collect();
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn include_dependencies(mut self, include: bool) -> Self {
        self.include_dependencies = include;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopAck {
    /// Stop recorded; the execution will wind down and roll back.
    Requested,
    /// Already terminal; nothing to stop.
    AlreadyFinished,
}

/// Health of one service as seen by the prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub service: ServiceName,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub struct Orchestrator {
    graph: Arc<DependencyGraph>,
    deployer: Arc<dyn Deployer>,
    prober: Arc<dyn HealthProber>,
    notifications: Option<NotificationDispatcher>,
    store: Arc<ExecutionStore>,
    settings: ExecutionSettings,
}

impl Orchestrator {
    pub fn new(
        graph: DependencyGraph,
        deployer: Arc<dyn Deployer>,
        prober: Arc<dyn HealthProber>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            deployer,
            prober,
            notifications: None,
            store: Arc::new(ExecutionStore::in_memory()),
            settings: ExecutionSettings::default(),
        }
    }

    /// Deliver execution events to `notifier`. Spawns the dispatch task, so
    /// this must be called inside a tokio runtime.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifications = Some(NotificationDispatcher::spawn(notifier));
        self
    }

    pub fn with_store(mut self, store: Arc<ExecutionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn store(&self) -> &ExecutionStore {
        &self.store
    }

    /// Compute the plan a request would run, without executing anything.
    pub fn plan(&self, strategy: Strategy, targets: &[ServiceName]) -> Result<DeploymentPlan, OrchestratorError> {
        Ok(build_plan(&self.graph, strategy, targets)?)
    }

    /// Validate and start a deployment. Returns as soon as the execution is registered.
    pub async fn submit(&self, request: DeploymentRequest) -> Result<ExecutionId, OrchestratorError> {
        let limit = request
            .concurrency_limit
            .unwrap_or_else(|| self.settings.limit_for(request.strategy));
        if limit == 0 {
            return Err(OrchestratorError::InvalidConcurrency(limit));
        }

        if let Some(unknown) = request
            .targets
            .iter()
            .find(|t| !self.graph.contains(t.as_str()))
        {
            return Err(PlanError::UnknownTarget(unknown.clone()).into());
        }

        let targets: BTreeSet<ServiceName> = if request.targets.is_empty() {
            self.graph.names().cloned().collect()
        } else if request.include_dependencies {
            self.graph.subgraph(&request.targets)?.names().cloned().collect()
        } else {
            request.targets.iter().cloned().collect()
        };

        let id = ExecutionId::generate();
        let pre_satisfied = self
            .check_external_dependencies(&targets, &id, &request)
            .await?;

        let targets: Vec<ServiceName> = targets.into_iter().collect();
        let plan = build_plan(&self.graph, request.strategy, &targets)?;
        let execution = Execution::new(
            id.clone(),
            plan,
            request.environment.clone(),
            request.version.clone(),
            limit,
        )
        .with_pre_satisfied(pre_satisfied);

        let (tx, rx) = watch::channel(execution.clone());
        let cancel = CancelSignal::new();
        self.store.register(id.clone(), rx, cancel.clone());

        let mut reporter = Reporter::detached().with_snapshots(tx);
        if let Some(ref dispatcher) = self.notifications {
            reporter = reporter.with_notifications(dispatcher.clone());
        }
        let engine = Engine::new(
            self.graph.clone(),
            self.deployer.clone(),
            self.prober.clone(),
            EngineSettings {
                concurrency_limit: limit,
                retry: self.settings.execution.retry,
            },
        )
        .with_cancel(cancel)
        .with_reporter(reporter);

        tracing::info!(
            execution = %id,
            strategy = %request.strategy,
            environment = %request.environment,
            version = %request.version,
            "submitted deployment"
        );

        let store = self.store.clone();
        tokio::spawn(async move {
            let finished = engine.execute(execution).await;
            let id = finished.id.clone();
            if let Err(e) = store.archive(finished) {
                tracing::warn!(execution = %id, "failed to persist execution: {}", e);
            }
        });

        Ok(id)
    }

    /// Probe every dependency of `targets` that is not itself a target.
    async fn check_external_dependencies(
        &self,
        targets: &BTreeSet<ServiceName>,
        id: &ExecutionId,
        request: &DeploymentRequest,
    ) -> Result<BTreeSet<ServiceName>, OrchestratorError> {
        let mut external = BTreeSet::new();
        for target in targets {
            for dependency in self.graph.dependencies(target.as_str()) {
                if !targets.contains(dependency) && external.insert(dependency.clone()) {
                    let Some(node) = self.graph.node(dependency.as_str()) else {
                        continue;
                    };
                    let release = Release::new(node, id, &request.environment, &request.version);
                    if let Err(reason) = probe_once(self.prober.as_ref(), &release).await {
                        return Err(OrchestratorError::UnsatisfiedDependency {
                            service: target.clone(),
                            dependency: dependency.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        Ok(external)
    }

    /// Latest snapshot. Never blocks on a running execution.
    pub fn status(&self, id: &ExecutionId) -> Result<Execution, OrchestratorError> {
        self.store
            .snapshot(id)
            .ok_or_else(|| OrchestratorError::UnknownExecution(id.clone()))
    }

    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self, id: &ExecutionId) -> Result<StopAck, OrchestratorError> {
        let snapshot = self.status(id)?;
        if snapshot.is_terminal() {
            return Ok(StopAck::AlreadyFinished);
        }
        match self.store.cancel_signal(id) {
            Some(cancel) => {
                tracing::info!(execution = %id, "stop requested");
                cancel.cancel();
                Ok(StopAck::Requested)
            }
            None => Ok(StopAck::AlreadyFinished),
        }
    }

    /// Most recent executions first.
    pub fn list(&self, limit: Option<usize>) -> Vec<ExecutionSummary> {
        self.store.list(&ListFilter {
            limit,
            ..ListFilter::default()
        })
    }

    pub fn list_filtered(&self, filter: &ListFilter) -> Vec<ExecutionSummary> {
        self.store.list(filter)
    }

    /// Wait for the execution to reach a terminal verdict.
    pub async fn wait(&self, id: &ExecutionId) -> Result<Execution, OrchestratorError> {
        self.store
            .wait(id)
            .await
            .ok_or_else(|| OrchestratorError::UnknownExecution(id.clone()))
    }

    /// Wait until every notification queued so far has been delivered.
    pub async fn flush_notifications(&self) {
        if let Some(ref dispatcher) = self.notifications {
            dispatcher.flush().await;
        }
    }

    pub async fn environment_health(&self, environment: &str) -> Vec<ServiceHealth> {
        environment_health(&self.graph, self.prober.as_ref(), environment).await
    }
}

/// Probe every service in `graph` concurrently, in ascending name order.
pub async fn environment_health(
    graph: &DependencyGraph,
    prober: &dyn HealthProber,
    environment: &str,
) -> Vec<ServiceHealth> {
    let id = ExecutionId::new(format!("health-{environment}"));
    let releases: Vec<Release> = graph
        .nodes()
        .map(|node| Release::new(node, &id, environment, "current"))
        .collect();

    let results = futures::future::join_all(
        releases.iter().map(|release| probe_once(prober, release)),
    )
    .await;

    releases
        .iter()
        .zip(results)
        .map(|(release, result)| ServiceHealth {
            service: release.service.clone(),
            healthy: result.is_ok(),
            detail: result.err(),
        })
        .collect()
}

/// A single probe bounded by the service timeout; `Err` carries the reason.
async fn probe_once(prober: &dyn HealthProber, release: &Release) -> Result<(), String> {
    match tokio::time::timeout(release.timeout, prober.probe(release)).await {
        Ok(Ok(HealthStatus::Healthy)) => Ok(()),
        Ok(Ok(HealthStatus::Unhealthy { reason })) => Err(reason),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("health probe timed out after {:?}", release.timeout)),
    }
}
