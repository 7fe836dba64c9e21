//! Core data models for the autoscaler

use serde::{Deserialize, Serialize};

/// One resource-usage sample as reported by a container's stats feed.
///
/// All CPU fields are cumulative counters, so a snapshot only means something
/// when compared with an earlier snapshot of the same container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatSnapshot {
    pub cpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    /// Host-wide cumulative CPU time
    pub system_cpu_usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    pub percpu_usage: Vec<f64>,
    pub total_usage: f64,
    pub usage_in_kernelmode: f64,
    pub usage_in_usermode: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub failcnt: f64,
    pub limit: f64,
    pub max_usage: f64,
    pub usage: f64,
}

impl StatSnapshot {
    /// CPU utilization between `previous` and `self`, in percent.
    ///
    /// A zero host CPU delta yields a non-finite value rather than a panic.
    pub fn cpu_percent_since(&self, previous: &StatSnapshot) -> f64 {
        let container_delta =
            self.cpu_stats.cpu_usage.total_usage - previous.cpu_stats.cpu_usage.total_usage;
        let system_delta = self.cpu_stats.system_cpu_usage - previous.cpu_stats.system_cpu_usage;
        container_delta * 100.0 / system_delta
    }

    /// Current memory usage in bytes
    pub fn memory_usage(&self) -> f64 {
        self.memory_stats.usage
    }
}

/// A running container as returned by the discovery API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "Id")]
    pub id: String,
}

impl ContainerInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Latest metrics published by a watcher
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContainerUsage {
    pub cpu_percent: f64,
    pub memory_bytes: f64,
}
