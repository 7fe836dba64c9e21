//! Scale decisions from smoothed utilization
//!
//! The decision engine turns per-tick average utilization into votes, keeps
//! the most recent votes in a fixed window and only acts when the whole
//! window agrees. Each firing moves the container count by exactly one.

mod engine;
mod window;

pub use engine::{Decision, DecisionEngine, EngineConfig, TickOutcome};
pub use window::VoteWindow;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Performs the actual change of a service's container count
#[async_trait]
pub trait ScaleExecutor: Send + Sync {
    /// Scale `app`/`service` to `target` containers
    async fn scale(&self, app: &str, service: &str, target: usize) -> Result<()>;
}

/// Thresholds and bounds for one autoscaled service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub app: String,
    pub service: String,
    /// Average CPU percentage at or above which a tick votes to scale out
    pub cpu_high: f64,
    /// Average CPU percentage at or below which a tick may vote to scale in
    pub cpu_low: f64,
    /// Average memory bytes at or above which a tick votes to scale out
    pub memory_high: f64,
    /// Average memory bytes at or below which a tick may vote to scale in
    pub memory_low: f64,
    /// Number of consecutive agreeing votes needed to fire
    pub periods: usize,
    pub min_containers: usize,
    pub max_containers: usize,
}

impl ScalingConfig {
    /// Config for `app`/`service` with default thresholds
    pub fn new(app: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            service: service.into(),
            cpu_high: 80.0,
            cpu_low: 20.0,
            memory_high: 1024.0 * 1024.0 * 1024.0,
            memory_low: 128.0 * 1024.0 * 1024.0,
            periods: 5,
            min_containers: 1,
            max_containers: 10,
        }
    }

    /// Reject configurations the engine cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.app.is_empty() || self.service.is_empty() {
            anyhow::bail!("app and service must be set");
        }
        if self.periods == 0 {
            anyhow::bail!("periods must be at least 1");
        }
        if u32::try_from(self.periods).is_err() {
            anyhow::bail!("periods ({}) exceeds {}", self.periods, u32::MAX);
        }
        if self.min_containers > self.max_containers {
            anyhow::bail!(
                "min_containers ({}) exceeds max_containers ({})",
                self.min_containers,
                self.max_containers
            );
        }
        if self.cpu_low > self.cpu_high {
            anyhow::bail!(
                "cpu_low ({}) exceeds cpu_high ({})",
                self.cpu_low,
                self.cpu_high
            );
        }
        if self.memory_low > self.memory_high {
            anyhow::bail!(
                "memory_low ({}) exceeds memory_high ({})",
                self.memory_low,
                self.memory_high
            );
        }
        Ok(())
    }
}

/// Per-tick classification of average utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    ScaleIn,
    Hold,
    ScaleOut,
}

impl Vote {
    /// Classify averages against the thresholds.
    ///
    /// Either resource running hot votes out; both running cold votes in.
    /// A non-finite average is neither high nor low.
    pub fn classify(avg_cpu: f64, avg_memory: f64, config: &ScalingConfig) -> Self {
        let cpu = avg_cpu.is_finite().then_some(avg_cpu);
        let memory = avg_memory.is_finite().then_some(avg_memory);

        let hot = cpu.is_some_and(|c| c >= config.cpu_high)
            || memory.is_some_and(|m| m >= config.memory_high);
        let cold = cpu.is_some_and(|c| c <= config.cpu_low)
            && memory.is_some_and(|m| m <= config.memory_low);

        if hot {
            Vote::ScaleOut
        } else if cold {
            Vote::ScaleIn
        } else {
            Vote::Hold
        }
    }

    pub fn value(self) -> i64 {
        match self {
            Vote::ScaleIn => -1,
            Vote::Hold => 0,
            Vote::ScaleOut => 1,
        }
    }
}

/// Direction of a fired decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Out,
    In,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::Out => "scale_out",
            ScaleDirection::In => "scale_in",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
