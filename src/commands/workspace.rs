// ABOUTME: Loads the project configuration and wires up capabilities for a command.
// ABOUTME: Shared by every command that needs the graph, the store or an orchestrator.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use stagehand::config::Config;
use stagehand::error::{Error, Result};
use stagehand::execution::ExecutionStore;
use stagehand::graph::DependencyGraph;
use stagehand::ops::{
    CommandDeployer, FanoutNotifier, HttpProber, Notifier, TracingNotifier, WebhookNotifier,
};
use stagehand::orchestrator::Orchestrator;

/// The discovered configuration and the directory it was found in.
pub struct Workspace {
    pub dir: PathBuf,
    pub config: Config,
}

impl Workspace {
    pub fn discover() -> Result<Self> {
        let dir = env::current_dir()?;
        let config = Config::discover(&dir)?;
        Ok(Self { dir, config })
    }

    pub fn graph(&self) -> Result<DependencyGraph> {
        Ok(self.config.graph()?)
    }

    pub fn store(&self) -> Result<ExecutionStore> {
        Ok(ExecutionStore::open(self.config.state_dir(&self.dir))?)
    }

    /// Notifiers configured in the `notifications` section plus `extra`.
    pub fn notifier(&self, extra: Arc<dyn Notifier>) -> Arc<dyn Notifier> {
        let mut fanout = FanoutNotifier::new().with(extra);
        let log_events = self.config.notifications.as_ref().is_none_or(|n| n.log);
        if log_events {
            fanout = fanout.with(Arc::new(TracingNotifier));
        }
        if let Some(url) = self
            .config
            .notifications
            .as_ref()
            .and_then(|n| n.webhook.clone())
        {
            fanout = fanout.with(Arc::new(WebhookNotifier::new(url)));
        }
        Arc::new(fanout)
    }

    /// Orchestrator backed by the configured deploy commands and the HTTP prober.
    pub fn orchestrator(&self, notifier: Arc<dyn Notifier>) -> Result<Orchestrator> {
        let deployer = self
            .config
            .deployer
            .as_ref()
            .map(|d| CommandDeployer::from_config(d, &self.dir))
            .ok_or(Error::NoDeployer)?;

        Ok(Orchestrator::new(self.graph()?, Arc::new(deployer), Arc::new(HttpProber))
            .with_settings(self.config.execution_settings())
            .with_store(Arc::new(self.store()?))
            .with_notifier(self.notifier(notifier)))
    }
}
