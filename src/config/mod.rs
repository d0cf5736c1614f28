// ABOUTME: Configuration types and parsing for stagehand.yml.
// ABOUTME: Handles YAML parsing, file discovery, defaults and graph construction.

mod execution;
mod init;
mod service;

pub use execution::{ExecutionConfig, ExecutionSettings, StrategyConfig};
pub use init::init_config;
pub use service::{HealthcheckConfig, ServiceConfig, ServiceDefaults};

use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, GraphError, ServiceNode};
use crate::plan::Strategy;
use crate::types::{ImageRef, ServiceName};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "stagehand.yml";
pub const CONFIG_FILENAME_ALT: &str = "stagehand.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stagehand/config.yml";

/// Default directory for persisted execution records, relative to the config.
pub const DEFAULT_STATE_DIR: &str = ".stagehand/executions";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub services: BTreeMap<ServiceName, ServiceConfig>,

    #[serde(default)]
    pub defaults: ServiceDefaults,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub strategies: HashMap<Strategy, StrategyConfig>,

    #[serde(default)]
    pub deployer: Option<DeployerConfig>,

    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,

    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Shell commands run by the command deployer.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployerConfig {
    pub deploy: String,

    #[serde(default)]
    pub rollback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub webhook: Option<String>,

    /// Log every execution event through tracing.
    #[serde(default = "default_log_events")]
    pub log: bool,
}

fn default_log_events() -> bool {
    true
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Find and load the first config file present in `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Build the validated dependency graph, applying service defaults.
    pub fn graph(&self) -> std::result::Result<DependencyGraph, GraphError> {
        let nodes = self.services.iter().map(|(name, service)| {
            let health_timeout = service.health.as_ref().and_then(|h| h.timeout);
            let mut node = ServiceNode::new(name.clone())
                .depends_on(service.dependencies.iter().cloned())
                .priority(service.priority)
                .timeout(health_timeout.unwrap_or(self.defaults.timeout))
                .max_retries(service.max_retries.unwrap_or(self.defaults.max_retries));
            if let Some(ref image) = service.image {
                node = node.image(image.clone());
            }
            if let Some(ref health) = service.health {
                node = node.health(health.url.clone());
            }
            node
        });
        DependencyGraph::build(nodes)
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            execution: self.execution.clone(),
            strategies: self.strategies.clone(),
        }
    }

    /// Directory where execution records are persisted.
    pub fn state_dir(&self, base: &Path) -> PathBuf {
        let dir = self
            .state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        if dir.is_absolute() {
            dir
        } else {
            base.join(dir)
        }
    }

    pub fn template() -> Self {
        let mut services = BTreeMap::new();
        let names = ["user-service", "order-service", "api-gateway"];
        let mut previous: Option<ServiceName> = None;
        for (i, raw) in names.iter().enumerate() {
            let Ok(name) = ServiceName::new(raw) else {
                continue;
            };
            let service = ServiceConfig {
                image: ImageRef::parse(&format!("registry.example.com/{raw}")).ok(),
                dependencies: previous.iter().cloned().collect(),
                priority: (names.len() - i) as i32,
                health: Some(HealthcheckConfig {
                    url: format!("http://{raw}:8080/health"),
                    timeout: None,
                }),
                max_retries: None,
            };
            previous = Some(name.clone());
            services.insert(name, service);
        }

        Config {
            services,
            defaults: ServiceDefaults::default(),
            execution: ExecutionConfig::default(),
            strategies: HashMap::new(),
            deployer: Some(DeployerConfig {
                deploy: "./scripts/deploy.sh".to_string(),
                rollback: Some("./scripts/rollback.sh".to_string()),
            }),
            notifications: None,
            state_dir: None,
        }
    }
}

/// Validate a graph definition without executing anything.
pub fn validate_graph(config: &Config) -> std::result::Result<(), GraphError> {
    config.graph().map(|_| ())
}
