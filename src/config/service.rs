// ABOUTME: Per-service entries of the dependency graph definition.
// ABOUTME: Covers image, dependencies, priority, health target and retry budget.

use serde::Deserialize;
use std::time::Duration;

use crate::graph::{DEFAULT_MAX_RETRIES, DEFAULT_PROBE_TIMEOUT};
use crate::types::{ImageRef, ServiceName};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// Image to deploy; defaults to an image named after the service.
    #[serde(default)]
    pub image: Option<ImageRef>,

    #[serde(default)]
    pub dependencies: Vec<ServiceName>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub health: Option<HealthcheckConfig>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    pub url: String,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Values applied to services that leave a field unset.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDefaults {
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}
