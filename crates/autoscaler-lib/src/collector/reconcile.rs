//! Watcher reconciliation loop
//!
//! Periodically lists the live containers of the target service and aligns
//! the set of stats watchers with it: new containers get a watcher, vanished
//! ones are evicted. This loop is the only place watchers are started, so a
//! watcher that died on a broken stream is restarted here on the next tick if
//! its container is still running.

use super::store::MetricsStore;
use super::watcher::spawn_watcher;
use super::{ContainerDiscovery, StatsSource};
use crate::health::{components, HealthRegistry};
use crate::observability::ScalerMetrics;
use crate::scaler::ScalingConfig;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the reconciliation loop
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Time between discovery calls (default: 1 second)
    pub interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Changes applied by one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: Vec<String>,
    pub evicted: Vec<String>,
}

/// Keeps the watched container set equal to the discovered one
pub struct ReconcileLoop {
    scaling: Arc<ScalingConfig>,
    discovery: Arc<dyn ContainerDiscovery>,
    stats: Arc<dyn StatsSource>,
    store: Arc<MetricsStore>,
    health: Option<HealthRegistry>,
    config: ReconcileConfig,
    metrics: ScalerMetrics,
}

impl ReconcileLoop {
    pub fn new(
        scaling: Arc<ScalingConfig>,
        discovery: Arc<dyn ContainerDiscovery>,
        stats: Arc<dyn StatsSource>,
        store: Arc<MetricsStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            scaling,
            discovery,
            stats,
            store,
            health: None,
            config,
            metrics: ScalerMetrics::new(),
        }
    }

    /// Report discovery failures to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown signal arrives, then evict every watcher
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            app = %self.scaling.app,
            service = %self.scaling.service,
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting watcher reconciliation loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down watcher reconciliation loop");
                    break;
                }
            }
        }

        for container_id in self.store.watched_ids() {
            self.store.evict(&container_id);
        }
    }

    async fn tick(&self) {
        match self.reconcile_once().await {
            Ok(summary) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::RECONCILER).await;
                }
                if !summary.started.is_empty() || !summary.evicted.is_empty() {
                    info!(
                        started = ?summary.started,
                        evicted = ?summary.evicted,
                        watched = self.store.len(),
                        "Reconciled container watchers"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list containers, skipping reconciliation");
                self.metrics.inc_discovery_failures();
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::RECONCILER, format!("discovery failed: {e}"))
                        .await;
                }
            }
        }
        self.metrics.set_containers_watched(self.store.len() as i64);
    }

    /// One reconciliation pass.
    ///
    /// A discovery error aborts the pass before any watcher is touched.
    pub async fn reconcile_once(&self) -> Result<ReconcileSummary> {
        let containers = self
            .discovery
            .list_containers(&self.scaling.app, &self.scaling.service)
            .await?;

        let discovered: HashSet<String> = containers.into_iter().map(|c| c.id).collect();
        let mut summary = ReconcileSummary::default();

        for container_id in &discovered {
            if let Some(registration) = self.store.upsert_watcher(container_id) {
                debug!(container_id = %container_id, "Starting stats watcher");
                spawn_watcher(registration, self.store.clone(), self.stats.clone());
                summary.started.push(container_id.clone());
            }
        }

        for container_id in self.store.watched_ids() {
            if !discovered.contains(&container_id) && self.store.evict(&container_id) {
                debug!(container_id = %container_id, "Container gone, evicted watcher");
                summary.evicted.push(container_id);
            }
        }

        summary.started.sort();
        summary.evicted.sort();
        Ok(summary)
    }
}

/// Builder for creating the reconciliation loop
pub struct ReconcileLoopBuilder {
    scaling: Option<Arc<ScalingConfig>>,
    discovery: Option<Arc<dyn ContainerDiscovery>>,
    stats: Option<Arc<dyn StatsSource>>,
    store: Option<Arc<MetricsStore>>,
    health: Option<HealthRegistry>,
    config: ReconcileConfig,
}

impl ReconcileLoopBuilder {
    pub fn new() -> Self {
        Self {
            scaling: None,
            discovery: None,
            stats: None,
            store: None,
            health: None,
            config: ReconcileConfig::default(),
        }
    }

    pub fn scaling(mut self, scaling: Arc<ScalingConfig>) -> Self {
        self.scaling = Some(scaling);
        self
    }

    pub fn discovery(mut self, discovery: Arc<dyn ContainerDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSource>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn build(self) -> Result<ReconcileLoop> {
        let scaling = self
            .scaling
            .ok_or_else(|| anyhow::anyhow!("Scaling config is required"))?;
        let discovery = self
            .discovery
            .ok_or_else(|| anyhow::anyhow!("Container discovery is required"))?;
        let stats = self
            .stats
            .ok_or_else(|| anyhow::anyhow!("Stats source is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Metrics store is required"))?;

        let mut reconcile_loop = ReconcileLoop::new(scaling, discovery, stats, store, self.config);
        if let Some(health) = self.health {
            reconcile_loop = reconcile_loop.with_health(health);
        }
        Ok(reconcile_loop)
    }
}

impl Default for ReconcileLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
