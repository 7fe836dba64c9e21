//! Metrics collection from container stats streams
//!
//! This module keeps one streaming watcher per running container of the
//! target service. The reconciliation loop aligns the set of watchers with
//! the containers reported by discovery, and each watcher turns its stream
//! of cumulative counters into CPU and memory readings in the shared store.

mod frame;
mod reconcile;
mod store;
mod watcher;


pub use frame::{decode_snapshot, extract_payload, MIN_RECORD_LEN};
pub use reconcile::{ReconcileConfig, ReconcileLoop, ReconcileLoopBuilder, ReconcileSummary};
pub use store::{MetricsSnapshot, MetricsStore, Registration, StopSignal};
pub use watcher::{spawn_watcher, StatsWatcher, WatchExit};

use crate::models::ContainerInfo;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncBufRead;

/// A container's stats feed, read line by line
pub type RecordStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// Enumerates the running containers of a service
#[async_trait]
pub trait ContainerDiscovery: Send + Sync {
    /// List the live containers for `app`/`service`
    async fn list_containers(&self, app: &str, service: &str) -> Result<Vec<ContainerInfo>>;
}

/// Opens the streaming stats feed of a container
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Connect to the stats stream for `container_id`
    async fn open(&self, container_id: &str) -> Result<RecordStream>;
}
