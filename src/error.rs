// ABOUTME: Application-wide error types for stagehand.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::execution::{StoreError, Verdict};
use crate::graph::GraphError;
use crate::orchestrator::OrchestratorError;
use crate::plan::PlanError;
use crate::types::ExecutionId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid dependency graph: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid deployment plan: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("no deployer configured; add a `deployer` section to the config")]
    NoDeployer,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("execution {id} finished with verdict {verdict}")]
    Unsuccessful { id: ExecutionId, verdict: Verdict },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
