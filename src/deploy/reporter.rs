// ABOUTME: Publishes execution snapshots and lifecycle events as the engine makes progress.
// ABOUTME: Either sink is optional; a detached reporter drops everything.

use chrono::Utc;
use tokio::sync::watch;

use crate::execution::Execution;
use crate::ops::{ExecutionEvent, NotificationDispatcher};
use crate::types::ServiceName;

use super::ServiceState;

#[derive(Debug, Default)]
pub struct Reporter {
    snapshots: Option<watch::Sender<Execution>>,
    notifications: Option<NotificationDispatcher>,
}

impl Reporter {
    /// Reporter with no subscribers.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_snapshots(mut self, tx: watch::Sender<Execution>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    pub fn with_notifications(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifications = Some(dispatcher);
        self
    }

    /// Replace the published snapshot with the current record.
    pub fn publish(&self, execution: &Execution) {
        if let Some(ref tx) = self.snapshots {
            tx.send_replace(execution.clone());
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(ref dispatcher) = self.notifications {
            dispatcher.send(event);
        }
    }

    pub fn execution_started(&self, execution: &Execution) {
        self.publish(execution);
        self.emit(ExecutionEvent::ExecutionStarted {
            execution_id: execution.id.clone(),
            strategy: execution.strategy,
            environment: execution.environment.clone(),
            version: execution.version.clone(),
            services: execution.targets.clone(),
            at: execution.started_at,
        });
    }

    pub fn state_changed(&self, execution: &Execution, service: &ServiceName) {
        self.publish(execution);
        let Some(record) = execution.services.get(service) else {
            return;
        };
        let error = match record.state {
            ServiceState::Failed | ServiceState::Skipped => record
                .rollback_error
                .clone()
                .or_else(|| record.last_error.clone()),
            _ => None,
        };
        self.emit(ExecutionEvent::ServiceStateChanged {
            execution_id: execution.id.clone(),
            service: service.clone(),
            state: record.state,
            attempt: record.attempts,
            error,
            at: Utc::now(),
        });
    }

    pub fn rollback_started(&self, execution: &Execution) {
        self.publish(execution);
        self.emit(ExecutionEvent::RollbackStarted {
            execution_id: execution.id.clone(),
            services: execution.rollback_order.clone(),
            at: Utc::now(),
        });
    }

    pub fn execution_finished(&self, execution: &Execution) {
        self.publish(execution);
        self.emit(ExecutionEvent::ExecutionFinished {
            execution_id: execution.id.clone(),
            verdict: execution.verdict,
            healthy: execution.count(ServiceState::Healthy),
            failed: execution.count(ServiceState::Failed),
            skipped: execution.count(ServiceState::Skipped),
            rolled_back: execution.count(ServiceState::RolledBack),
            at: execution.finished_at.unwrap_or_else(Utc::now),
        });
    }
}
