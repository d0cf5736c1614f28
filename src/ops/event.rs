// ABOUTME: Execution lifecycle events delivered to notifiers.
// ABOUTME: Serialized as tagged JSON objects for webhooks and JSON output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deploy::ServiceState;
use crate::execution::Verdict;
use crate::plan::Strategy;
use crate::types::{ExecutionId, ServiceName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        strategy: Strategy,
        environment: String,
        version: String,
        services: Vec<ServiceName>,
        at: DateTime<Utc>,
    },
    ServiceStateChanged {
        execution_id: ExecutionId,
        service: ServiceName,
        state: ServiceState,
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at: DateTime<Utc>,
    },
    RollbackStarted {
        execution_id: ExecutionId,
        /// Services in the order they will be rolled back.
        services: Vec<ServiceName>,
        at: DateTime<Utc>,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        verdict: Verdict,
        healthy: usize,
        failed: usize,
        skipped: usize,
        rolled_back: usize,
        at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::ServiceStateChanged { execution_id, .. }
            | ExecutionEvent::RollbackStarted { execution_id, .. }
            | ExecutionEvent::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }

    /// Short name matching the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => "execution_started",
            ExecutionEvent::ServiceStateChanged { .. } => "service_state_changed",
            ExecutionEvent::RollbackStarted { .. } => "rollback_started",
            ExecutionEvent::ExecutionFinished { .. } => "execution_finished",
        }
    }
}
