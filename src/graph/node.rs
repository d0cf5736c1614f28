// ABOUTME: Service node definition: identity, dependency edges, priority and parameters.
// ABOUTME: Builder-style setters keep graph construction in tests and config terse.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::types::{ImageRef, ServiceName};

/// Default time budget for a single health probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Parameters handed to the deployer and prober for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParams {
    pub image: ImageRef,
    /// Health-check target, usually an `http://` URL.
    pub health: Option<String>,
    /// Timeout applied to each health probe.
    pub timeout: Duration,
    pub max_retries: u32,
}

/// A single service in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub name: ServiceName,
    pub dependencies: BTreeSet<ServiceName>,
    /// Higher deploys sooner when several services are eligible.
    pub priority: i32,
    pub params: DeploymentParams,
}

impl ServiceNode {
    /// A node with no dependencies whose image is named after the service.
    pub fn new(name: ServiceName) -> Self {
        let params = DeploymentParams {
            image: ImageRef::named(name.as_str()),
            health: None,
            timeout: DEFAULT_PROBE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        };
        Self {
            name,
            dependencies: BTreeSet::new(),
            priority: 0,
            params,
        }
    }

    pub fn depends_on<I>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = ServiceName>,
    {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn image(mut self, image: ImageRef) -> Self {
        self.params.image = image;
        self
    }

    pub fn health(mut self, target: impl Into<String>) -> Self {
        self.params.health = Some(target.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.params.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.params.max_retries = max_retries;
        self
    }
}
