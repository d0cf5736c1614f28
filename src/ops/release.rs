// ABOUTME: Per-service deployment context handed to deployers and probers.
// ABOUTME: Combines graph parameters with the request's environment and version.

use std::collections::HashMap;
use std::time::Duration;

use crate::graph::ServiceNode;
use crate::types::{ExecutionId, ImageRef, ServiceName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub execution_id: ExecutionId,
    pub service: ServiceName,
    pub environment: String,
    pub version: String,
    /// Image already pinned to `version`.
    pub image: ImageRef,
    pub health: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Release {
    pub fn new(node: &ServiceNode, execution_id: &ExecutionId, environment: &str, version: &str) -> Self {
        Self {
            execution_id: execution_id.clone(),
            service: node.name.clone(),
            environment: environment.to_string(),
            version: version.to_string(),
            image: node.params.image.with_version(version),
            health: node.params.health.clone(),
            timeout: node.params.timeout,
            max_retries: node.params.max_retries,
        }
    }

    /// Context exported to deploy and rollback commands.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "STAGEHAND_EXECUTION_ID".to_string(),
            self.execution_id.to_string(),
        );
        env.insert("STAGEHAND_SERVICE".to_string(), self.service.to_string());
        env.insert("STAGEHAND_ENVIRONMENT".to_string(), self.environment.clone());
        env.insert("STAGEHAND_VERSION".to_string(), self.version.clone());
        env.insert("STAGEHAND_IMAGE".to_string(), self.image.to_string());
        if let Some(ref health) = self.health {
            env.insert("STAGEHAND_HEALTH_URL".to_string(), health.clone());
        }
        env
    }
}
