// ABOUTME: Capability interfaces the engine consumes: deployer, health prober, notifier.
// ABOUTME: Also ships thin stock implementations (shell commands, plain HTTP, tracing).

mod command;
mod event;
mod http;
mod notify;
mod release;

pub use command::CommandDeployer;
pub use event::ExecutionEvent;
pub use http::{HttpError, HttpErrorKind, HttpProber};
pub use notify::{FanoutNotifier, NotificationDispatcher, TracingNotifier, WebhookNotifier};
pub use release::Release;

use async_trait::async_trait;

use crate::types::ServiceName;

/// Reference returned by a successful deploy call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployHandle {
    pub reference: String,
}

/// Outcome of a successful rollback call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReceipt {
    pub detail: String,
}

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy { reason: String },
}

/// A deploy attempt failed. Recoverable: drives per-service retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error("deploy command failed: {0}")]
    CommandFailed(String),

    #[error("deployment rejected: {0}")]
    Rejected(String),
}

/// A rollback call failed. Logged and recorded; never halts the sweep.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    #[error("rollback command failed: {0}")]
    CommandFailed(String),

    #[error("no rollback procedure configured for {0}")]
    NotSupported(ServiceName),

    #[error("rollback failed: {0}")]
    Failed(String),
}

/// A health probe could not produce a verdict. Recoverable.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("health probe transport error: {0}")]
    Transport(#[from] HttpError),

    #[error("health probe failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Transport(#[from] HttpError),

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("webhook rejected notification with HTTP {0}")]
    Rejected(u16),
}

/// Deploys and rolls back a single service.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, release: &Release) -> Result<DeployHandle, DeployError>;

    async fn rollback(&self, release: &Release) -> Result<RollbackReceipt, RollbackError>;
}

/// Checks whether a deployed service is healthy.
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, release: &Release) -> Result<HealthStatus, ProbeError>;
}

/// Receives execution events. Delivery is fire-and-forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError>;
}
