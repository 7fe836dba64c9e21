//! Autoscaler configuration

use anyhow::{Context, Result};
use autoscaler_lib::ScalingConfig;
use serde::Deserialize;
use std::time::Duration;

/// Autoscaler configuration, read from `AUTOSCALER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AutoscalerConfig {
    /// Application whose service is scaled
    pub app: String,

    /// Service within the application
    pub service: String,

    /// Base URL of the container controller API
    #[serde(default = "default_controller_addr")]
    pub controller_addr: String,

    /// Key sent as the `ApiKey` query parameter
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_cpu_high")]
    pub cpu_high: f64,

    #[serde(default = "default_cpu_low")]
    pub cpu_low: f64,

    /// Bytes
    #[serde(default = "default_memory_high")]
    pub memory_high: f64,

    /// Bytes
    #[serde(default = "default_memory_low")]
    pub memory_low: f64,

    /// Consecutive agreeing votes needed before scaling
    #[serde(default = "default_periods")]
    pub periods: usize,

    #[serde(default = "default_min_containers")]
    pub min_containers: usize,

    #[serde(default = "default_max_containers")]
    pub max_containers: usize,

    #[serde(default = "default_interval_ms")]
    pub reconcile_interval_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub decision_interval_ms: u64,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_controller_addr() -> String {
    "http://localhost:8080".to_string()
}

fn default_cpu_high() -> f64 {
    80.0
}

fn default_cpu_low() -> f64 {
    20.0
}

fn default_memory_high() -> f64 {
    1024.0 * 1024.0 * 1024.0
}

fn default_memory_low() -> f64 {
    128.0 * 1024.0 * 1024.0
}

fn default_periods() -> usize {
    5
}

fn default_min_containers() -> usize {
    1
}

fn default_max_containers() -> usize {
    10
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_api_port() -> u16 {
    9100
}

impl AutoscalerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("AUTOSCALER").try_parsing(true))
            .build()?;

        Self::from_source(source)
    }

    /// Deserialize and validate an already built configuration
    pub fn from_source(source: config::Config) -> Result<Self> {
        let config: AutoscalerConfig = source
            .try_deserialize()
            .context("Invalid autoscaler configuration")?;
        config.scaling().validate()?;
        Ok(config)
    }

    pub fn scaling(&self) -> ScalingConfig {
        ScalingConfig {
            app: self.app.clone(),
            service: self.service.clone(),
            cpu_high: self.cpu_high,
            cpu_low: self.cpu_low,
            memory_high: self.memory_high,
            memory_low: self.memory_low,
            periods: self.periods,
            min_containers: self.min_containers,
            max_containers: self.max_containers,
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn decision_interval(&self) -> Duration {
        Duration::from_millis(self.decision_interval_ms)
    }
}
