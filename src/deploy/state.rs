// ABOUTME: Per-service lifecycle states and the legal transitions between them.
// ABOUTME: The engine and rollback sweep only move services along these edges.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Waiting for admission.
    Pending,
    /// Deploy call in flight or being retried.
    Deploying,
    /// Deployed; waiting for a healthy probe.
    HealthChecking,
    Healthy,
    Failed,
    RollingBack,
    RolledBack,
    /// Never admitted because a dependency failed or the execution stopped.
    Skipped,
}

impl ServiceState {
    pub const ALL: [ServiceState; 8] = [
        ServiceState::Pending,
        ServiceState::Deploying,
        ServiceState::HealthChecking,
        ServiceState::Healthy,
        ServiceState::Failed,
        ServiceState::RollingBack,
        ServiceState::RolledBack,
        ServiceState::Skipped,
    ];

    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Pending, Deploying)
                | (Pending, Skipped)
                | (Deploying, HealthChecking)
                | (Deploying, Failed)
                | (HealthChecking, Healthy)
                | (HealthChecking, Failed)
                | (Healthy, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
        )
    }

    /// Counts against the concurrency limit.
    pub fn is_active(self) -> bool {
        matches!(self, ServiceState::Deploying | ServiceState::HealthChecking)
    }

    /// No further forward progress will happen for this service.
    pub fn is_settled(self) -> bool {
        !matches!(self, ServiceState::Pending) && !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Pending => "pending",
            ServiceState::Deploying => "deploying",
            ServiceState::HealthChecking => "health_checking",
            ServiceState::Healthy => "healthy",
            ServiceState::Failed => "failed",
            ServiceState::RollingBack => "rolling_back",
            ServiceState::RolledBack => "rolled_back",
            ServiceState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
