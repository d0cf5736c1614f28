// ABOUTME: Test support utilities.
// ABOUTME: Scripted deployer/prober fakes, a recording notifier, and graph builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use stagehand::deploy::{Engine, EngineSettings, RetryPolicy};
use stagehand::execution::Execution;
use stagehand::graph::{DependencyGraph, ServiceNode};
use stagehand::ops::{
    DeployError, DeployHandle, Deployer, ExecutionEvent, HealthProber, HealthStatus, Notifier,
    NotifyError, ProbeError, Release, RollbackError, RollbackReceipt,
};
use stagehand::plan::{Strategy, build_plan};
use stagehand::types::{ExecutionId, ServiceName};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("stagehand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn name(s: &str) -> ServiceName {
    ServiceName::new(s).unwrap()
}

pub fn names(list: &[&str]) -> Vec<ServiceName> {
    list.iter().map(|s| name(s)).collect()
}

/// Build a graph from `(service, dependencies, priority)` triples.
pub fn graph(services: &[(&str, &[&str], i32)]) -> DependencyGraph {
    DependencyGraph::build(services.iter().map(|(service, deps, priority)| {
        ServiceNode::new(name(service))
            .depends_on(deps.iter().map(|d| name(d)))
            .priority(*priority)
    }))
    .unwrap()
}

/// `{A:[], B:[A], C:[A], D:[B,C]}`.
pub fn diamond() -> DependencyGraph {
    graph(&[
        ("A", &[], 0),
        ("B", &["A"], 0),
        ("C", &["A"], 0),
        ("D", &["B", "C"], 0),
    ])
}

/// A fresh execution over the whole graph.
pub fn execution(graph: &DependencyGraph, strategy: Strategy, limit: usize) -> Execution {
    let plan = build_plan(graph, strategy, &[]).unwrap();
    Execution::new(ExecutionId::generate(), plan, "test", "1.0.0", limit)
}

pub fn engine(graph: DependencyGraph, ops: &Arc<FakeOps>, limit: usize) -> Engine {
    Engine::new(
        Arc::new(graph),
        ops.clone(),
        ops.clone(),
        EngineSettings {
            concurrency_limit: limit,
            retry: RetryPolicy::immediate(),
        },
    )
}

/// One call made against the fake infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    Deploy(String),
    Probe(String),
    Rollback(String),
}

/// Deployer and prober with scripted failures, delays and a call log.
#[derive(Default)]
pub struct FakeOps {
    deploy_failures: Mutex<HashMap<String, u32>>,
    probe_failures: Mutex<HashMap<String, u32>>,
    failing_rollbacks: HashSet<String>,
    deploy_delay: Duration,
    service_delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` deploys of `service` fail. `u32::MAX` means always.
    pub fn fail_deploys(self, service: &str, times: u32) -> Self {
        self.deploy_failures.lock().insert(service.to_string(), times);
        self
    }

    /// The next `times` probes of `service` report unhealthy.
    pub fn fail_probes(self, service: &str, times: u32) -> Self {
        self.probe_failures.lock().insert(service.to_string(), times);
        self
    }

    pub fn fail_rollback(mut self, service: &str) -> Self {
        self.failing_rollbacks.insert(service.to_string());
        self
    }

    /// Every deploy call takes at least `delay`.
    pub fn deploy_delay(mut self, delay: Duration) -> Self {
        self.deploy_delay = delay;
        self
    }

    pub fn service_delay(mut self, service: &str, delay: Duration) -> Self {
        self.service_delays.insert(service.to_string(), delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Services in the order their first deploy call started.
    pub fn deploy_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for call in self.calls.lock().iter() {
            if let Call::Deploy(s) = call
                && !seen.contains(s)
            {
                seen.push(s.clone());
            }
        }
        seen
    }

    pub fn rollbacks(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Rollback(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(table: &Mutex<HashMap<String, u32>>, service: &str) -> bool {
        let mut table = table.lock();
        match table.get_mut(service) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Deployer for FakeOps {
    async fn deploy(&self, release: &Release) -> Result<DeployHandle, DeployError> {
        let service = release.service.to_string();
        self.calls.lock().push(Call::Deploy(service.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .service_delays
            .get(&service)
            .copied()
            .unwrap_or(self.deploy_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::take_failure(&self.deploy_failures, &service) {
            return Err(DeployError::CommandFailed(format!("scripted failure for {service}")));
        }
        Ok(DeployHandle {
            reference: format!("{service}@{}", release.version),
        })
    }

    async fn rollback(&self, release: &Release) -> Result<RollbackReceipt, RollbackError> {
        let service = release.service.to_string();
        self.calls.lock().push(Call::Rollback(service.clone()));
        if self.failing_rollbacks.contains(&service) {
            return Err(RollbackError::Failed(format!("scripted rollback failure for {service}")));
        }
        Ok(RollbackReceipt {
            detail: format!("reverted {service}"),
        })
    }
}

#[async_trait]
impl HealthProber for FakeOps {
    async fn probe(&self, release: &Release) -> Result<HealthStatus, ProbeError> {
        let service = release.service.to_string();
        self.calls.lock().push(Call::Probe(service.clone()));
        if Self::take_failure(&self.probe_failures, &service) {
            return Ok(HealthStatus::Unhealthy {
                reason: format!("{service} not ready"),
            });
        }
        Ok(HealthStatus::Healthy)
    }
}

/// Keeps every event it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ExecutionEvent::name).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Poll `check` until it passes or about two seconds elapse.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
