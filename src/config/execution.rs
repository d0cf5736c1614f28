// ABOUTME: Execution settings: concurrency bounds, retry backoff and per-strategy overrides.
// ABOUTME: Resolves the effective concurrency limit for a deployment request.

use serde::Deserialize;
use std::collections::HashMap;

use crate::deploy::RetryPolicy;
use crate::plan::Strategy;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_concurrency_limit() -> usize {
    4
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

/// Settings the orchestrator applies to every submission.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSettings {
    pub execution: ExecutionConfig,
    pub strategies: HashMap<Strategy, StrategyConfig>,
}

impl ExecutionSettings {
    /// Concurrency limit for `strategy` when the request does not set one.
    pub fn limit_for(&self, strategy: Strategy) -> usize {
        self.strategies
            .get(&strategy)
            .and_then(|s| s.max_concurrent)
            .unwrap_or(self.execution.concurrency_limit)
    }
}
