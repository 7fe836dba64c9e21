//! In-memory collaborators shared by the unit tests

use crate::collector::{ContainerDiscovery, RecordStream, StatsSource};
use crate::models::ContainerInfo;
use crate::scaler::ScaleExecutor;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

/// A framed stats record line carrying the given counters
pub fn stats_line(total_usage: u64, system_cpu_usage: u64, memory_usage: u64) -> String {
    format!(
        "data: {{\"cpu_stats\":{{\"cpu_usage\":{{\"percpu_usage\":[{total_usage}],\"total_usage\":{total_usage},\"usage_in_kernelmode\":0,\"usage_in_usermode\":{total_usage}}},\"system_cpu_usage\":{system_cpu_usage}}},\"memory_stats\":{{\"failcnt\":0,\"limit\":0,\"max_usage\":{memory_usage},\"usage\":{memory_usage}}}}}\n"
    )
}

/// Discovery returning a scripted container list, or an error when unset
#[derive(Default)]
pub struct FakeDiscovery {
    containers: Mutex<Option<Vec<ContainerInfo>>>,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ids: &[&str]) {
        let containers = ids.iter().map(|id| ContainerInfo::new(*id)).collect();
        *self.containers.lock().unwrap() = Some(containers);
    }

    pub fn fail(&self) {
        *self.containers.lock().unwrap() = None;
    }
}

#[async_trait]
impl ContainerDiscovery for FakeDiscovery {
    async fn list_containers(&self, _app: &str, _service: &str) -> Result<Vec<ContainerInfo>> {
        self.containers
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("discovery unavailable"))
    }
}

/// Stats source serving fixed feeds, optionally live feeds for the rest
#[derive(Default)]
pub struct FakeStats {
    feeds: Mutex<HashMap<String, String>>,
    live: Mutex<HashMap<String, tokio::io::DuplexStream>>,
    block_unknown: bool,
}

impl FakeStats {
    /// Unknown containers fail to connect
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown containers connect to a live feed, idle until written via [`FakeStats::take_writer`]
    pub fn stalled() -> Self {
        Self {
            block_unknown: true,
            ..Self::default()
        }
    }

    pub fn set_feed(&self, container_id: &str, feed: String) {
        self.feeds
            .lock()
            .unwrap()
            .insert(container_id.to_string(), feed);
    }

    /// Write side of the most recent live feed opened for `container_id`
    pub fn take_writer(&self, container_id: &str) -> Option<tokio::io::DuplexStream> {
        self.live.lock().unwrap().remove(container_id)
    }
}

#[async_trait]
impl StatsSource for FakeStats {
    async fn open(&self, container_id: &str) -> Result<RecordStream> {
        if let Some(feed) = self.feeds.lock().unwrap().get(container_id) {
            return Ok(Box::new(Cursor::new(feed.clone().into_bytes())));
        }

        if self.block_unknown {
            let (writer, reader) = tokio::io::duplex(4096);
            self.live
                .lock()
                .unwrap()
                .insert(container_id.to_string(), writer);
            return Ok(Box::new(tokio::io::BufReader::new(reader)));
        }

        anyhow::bail!("no such container: {}", container_id)
    }
}

/// Executor recording every requested target
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<usize>>,
    fail: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScaleExecutor for RecordingExecutor {
    async fn scale(&self, _app: &str, _service: &str, target: usize) -> Result<()> {
        self.calls.lock().unwrap().push(target);
        if self.fail {
            anyhow::bail!("scale API rejected request");
        }
        Ok(())
    }
}
