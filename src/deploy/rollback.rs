// ABOUTME: Rollback sweep run after a failed or stopped forward pass.
// ABOUTME: Reverts healthy services one at a time in reverse admission order.

use crate::execution::Execution;
use crate::graph::DependencyGraph;
use crate::ops::{Deployer, Release, RollbackError};
use crate::types::ServiceName;

use super::{Reporter, ServiceState};

/// What the sweep did, in the order it did it.
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub rolled_back: Vec<ServiceName>,
    pub failed: Vec<(ServiceName, RollbackError)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Roll back every `Healthy` service, most recently admitted first.
///
/// A failing rollback marks that service `Failed` with the error recorded in
/// `rollback_error`; the sweep always continues with the next service.
pub async fn rollback(
    execution: &mut Execution,
    graph: &DependencyGraph,
    deployer: &dyn Deployer,
    reporter: &Reporter,
) -> RollbackReport {
    let order: Vec<ServiceName> = execution
        .admission_order
        .iter()
        .rev()
        .filter(|name| execution.state(name.as_str()) == Some(ServiceState::Healthy))
        .cloned()
        .collect();

    execution.rollback_order = order.clone();
    let mut report = RollbackReport::default();
    if order.is_empty() {
        return report;
    }

    tracing::warn!(execution = %execution.id, services = order.len(), "rolling back");
    reporter.rollback_started(execution);

    for service in order {
        let Some(node) = graph.node(service.as_str()) else {
            continue;
        };
        if let Err(e) = execution.transition(&service, ServiceState::RollingBack) {
            tracing::error!("{}", e);
            continue;
        }
        reporter.state_changed(execution, &service);

        let release = Release::new(node, &execution.id, &execution.environment, &execution.version);
        let next = match deployer.rollback(&release).await {
            Ok(receipt) => {
                tracing::info!(service = %service, detail = %receipt.detail, "rolled back");
                report.rolled_back.push(service.clone());
                ServiceState::RolledBack
            }
            Err(e) => {
                tracing::warn!(service = %service, "rollback failed: {}", e);
                if let Some(record) = execution.record_mut(service.as_str()) {
                    record.rollback_error = Some(e.to_string());
                }
                report.failed.push((service.clone(), e));
                ServiceState::Failed
            }
        };

        if let Err(e) = execution.transition(&service, next) {
            tracing::error!("{}", e);
        }
        reporter.state_changed(execution, &service);
    }

    report
}
