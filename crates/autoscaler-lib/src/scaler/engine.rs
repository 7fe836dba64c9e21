//! Decision engine loop
//!
//! Once per tick: average the latest metrics of all watched containers,
//! classify them into a vote, push it into the window and, if the window is
//! unanimous, request a one-step scale within the configured bounds.

use super::{ScaleDirection, ScaleExecutor, ScalingConfig, Vote, VoteWindow};
use crate::collector::MetricsStore;
use crate::health::{components, HealthRegistry};
use crate::observability::{ScalerMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the decision loop
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between votes (default: 1 second)
    pub interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// What a tick did after voting
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Window not unanimous
    None,
    /// Window fired but the container count is already at the bound
    Suppressed {
        direction: ScaleDirection,
        current: usize,
    },
    /// Scale request accepted
    Requested {
        direction: ScaleDirection,
        current: usize,
        target: usize,
    },
    /// Scale request failed; not retried
    Failed {
        direction: ScaleDirection,
        current: usize,
        target: usize,
        error: String,
    },
}

/// Result of a single decision tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub avg_cpu: f64,
    pub avg_memory: f64,
    pub vote: Vote,
    /// Window sum after this tick's vote, before any reset
    pub window_sum: i64,
    pub decision: Decision,
}

/// Turns smoothed utilization into scale requests
pub struct DecisionEngine {
    scaling: Arc<ScalingConfig>,
    store: Arc<MetricsStore>,
    executor: Arc<dyn ScaleExecutor>,
    window: VoteWindow,
    config: EngineConfig,
    health: Option<HealthRegistry>,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
}

impl DecisionEngine {
    pub fn new(
        scaling: Arc<ScalingConfig>,
        store: Arc<MetricsStore>,
        executor: Arc<dyn ScaleExecutor>,
        config: EngineConfig,
    ) -> Self {
        let logger = StructuredLogger::new(&scaling.app, &scaling.service);
        Self {
            window: VoteWindow::new(scaling.periods),
            scaling,
            store,
            executor,
            config,
            health: None,
            metrics: ScalerMetrics::new(),
            logger,
        }
    }

    /// Report readiness and scale failures to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn window(&self) -> &VoteWindow {
        &self.window
    }

    /// Delay before the first vote, giving watchers time to prime
    pub fn warmup(&self) -> Duration {
        let periods = u32::try_from(self.scaling.periods).unwrap_or(u32::MAX);
        self.config.interval.saturating_mul(periods)
    }

    /// Vote once per tick until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            app = %self.scaling.app,
            service = %self.scaling.service,
            periods = self.scaling.periods,
            warmup_ms = self.warmup().as_millis() as u64,
            "Starting decision engine"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.warmup()) => {}
            _ = shutdown.recv() => {
                info!("Decision engine stopped during warm-up");
                return;
            }
        }

        if let Some(health) = &self.health {
            health.set_ready(true).await;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down decision engine");
                    break;
                }
            }
        }
    }

    /// Cast one vote and act on the window
    pub async fn tick(&mut self) -> TickOutcome {
        let start = Instant::now();
        let snapshot = self.store.snapshot();
        let avg_cpu = snapshot.average_cpu();
        let avg_memory = snapshot.average_memory();
        let current = snapshot.container_count();

        let vote = Vote::classify(avg_cpu, avg_memory, &self.scaling);
        self.window.push(vote);
        let window_sum = self.window.sum();

        self.metrics.set_averages(avg_cpu, avg_memory);
        self.metrics.set_window_sum(window_sum);
        self.metrics.set_containers_watched(current as i64);

        let decision = match self.window.unanimous() {
            Some(direction) => {
                // Fired windows start over even if the bounds swallow the decision
                self.window.reset();
                self.apply(direction, current).await
            }
            None => {
                debug!(
                    sum = window_sum,
                    cpu = avg_cpu,
                    memory = avg_memory,
                    containers = current,
                    "No need to scale"
                );
                Decision::None
            }
        };

        self.metrics
            .observe_decision_latency(start.elapsed().as_secs_f64());

        TickOutcome {
            avg_cpu,
            avg_memory,
            vote,
            window_sum,
            decision,
        }
    }

    async fn apply(&self, direction: ScaleDirection, current: usize) -> Decision {
        let target = match direction {
            ScaleDirection::In if current <= self.scaling.min_containers => {
                self.logger
                    .log_scale_suppressed(direction, current, self.scaling.min_containers);
                self.metrics.inc_suppressed_decisions(direction);
                return Decision::Suppressed { direction, current };
            }
            ScaleDirection::Out if current >= self.scaling.max_containers => {
                self.logger
                    .log_scale_suppressed(direction, current, self.scaling.max_containers);
                self.metrics.inc_suppressed_decisions(direction);
                return Decision::Suppressed { direction, current };
            }
            ScaleDirection::Out => (current + 1).min(self.scaling.max_containers),
            ScaleDirection::In => current - 1,
        };

        match self
            .executor
            .scale(&self.scaling.app, &self.scaling.service, target)
            .await
        {
            Ok(()) => {
                self.logger.log_scale_request(direction, current, target);
                self.metrics.inc_scale_requests(direction);
                if let Some(health) = &self.health {
                    health.set_healthy(components::DECISION_ENGINE).await;
                }
                Decision::Requested {
                    direction,
                    current,
                    target,
                }
            }
            Err(e) => {
                let error = format!("{e:#}");
                self.logger.log_scale_failed(direction, target, &error);
                self.metrics.inc_scale_failures(direction);
                if let Some(health) = &self.health {
                    health
                        .set_degraded(
                            components::DECISION_ENGINE,
                            format!("{direction} failed: {error}"),
                        )
                        .await;
                }
                Decision::Failed {
                    direction,
                    current,
                    target,
                    error,
                }
            }
        }
    }
}
