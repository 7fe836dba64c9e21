//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (watched containers, averages, votes, scale activity)
//! - Structured JSON logging with tracing

use crate::scaler::ScaleDirection;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for decision tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    containers_watched: IntGauge,
    average_cpu_percent: Gauge,
    average_memory_bytes: Gauge,
    vote_window_sum: IntGauge,
    scale_requests: IntCounterVec,
    suppressed_decisions: IntCounterVec,
    scale_failures: IntCounterVec,
    discovery_failures: IntCounter,
    watcher_terminations: IntCounterVec,
    decision_latency_seconds: Histogram,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            containers_watched: register_int_gauge!(
                "autoscaler_containers_watched",
                "Number of containers with an active stats watcher"
            )
            .expect("Failed to register containers_watched"),

            average_cpu_percent: register_gauge!(
                "autoscaler_average_cpu_percent",
                "Average CPU utilization across watched containers at the last tick"
            )
            .expect("Failed to register average_cpu_percent"),

            average_memory_bytes: register_gauge!(
                "autoscaler_average_memory_bytes",
                "Average memory usage across watched containers at the last tick"
            )
            .expect("Failed to register average_memory_bytes"),

            vote_window_sum: register_int_gauge!(
                "autoscaler_vote_window_sum",
                "Sum of the votes currently held in the decision window"
            )
            .expect("Failed to register vote_window_sum"),

            scale_requests: register_int_counter_vec!(
                "autoscaler_scale_requests_total",
                "Scale requests accepted by the controller",
                &["direction"]
            )
            .expect("Failed to register scale_requests"),

            suppressed_decisions: register_int_counter_vec!(
                "autoscaler_suppressed_decisions_total",
                "Fired decisions dropped because the container bound was reached",
                &["direction"]
            )
            .expect("Failed to register suppressed_decisions"),

            scale_failures: register_int_counter_vec!(
                "autoscaler_scale_failures_total",
                "Scale requests rejected or not delivered",
                &["direction"]
            )
            .expect("Failed to register scale_failures"),

            discovery_failures: register_int_counter!(
                "autoscaler_discovery_failures_total",
                "Reconciliation ticks skipped because container listing failed"
            )
            .expect("Failed to register discovery_failures"),

            watcher_terminations: register_int_counter_vec!(
                "autoscaler_watcher_terminations_total",
                "Stats watchers that ended on their own",
                &["reason"]
            )
            .expect("Failed to register watcher_terminations"),

            decision_latency_seconds: register_histogram!(
                "autoscaler_decision_latency_seconds",
                "Time spent evaluating one decision tick, including the scale call",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register decision_latency_seconds"),
        }
    }
}

/// Autoscaler metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn set_containers_watched(&self, count: i64) {
        self.inner().containers_watched.set(count);
    }

    pub fn set_averages(&self, cpu_percent: f64, memory_bytes: f64) {
        self.inner().average_cpu_percent.set(cpu_percent);
        self.inner().average_memory_bytes.set(memory_bytes);
    }

    pub fn set_window_sum(&self, sum: i64) {
        self.inner().vote_window_sum.set(sum);
    }

    pub fn inc_scale_requests(&self, direction: ScaleDirection) {
        self.inner()
            .scale_requests
            .with_label_values(&[direction.as_str()])
            .inc();
    }

    pub fn inc_suppressed_decisions(&self, direction: ScaleDirection) {
        self.inner()
            .suppressed_decisions
            .with_label_values(&[direction.as_str()])
            .inc();
    }

    pub fn inc_scale_failures(&self, direction: ScaleDirection) {
        self.inner()
            .scale_failures
            .with_label_values(&[direction.as_str()])
            .inc();
    }

    pub fn inc_discovery_failures(&self) {
        self.inner().discovery_failures.inc();
    }

    pub fn inc_watcher_terminations(&self, reason: &str) {
        self.inner()
            .watcher_terminations
            .with_label_values(&[reason])
            .inc();
    }

    pub fn observe_decision_latency(&self, duration_secs: f64) {
        self.inner().decision_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for scaling events
///
/// Emits consistent event-tagged records for everything an operator would
/// want to grep for after the fact.
#[derive(Clone)]
pub struct StructuredLogger {
    app: String,
    service: String,
}

impl StructuredLogger {
    pub fn new(app: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            service: service.into(),
        }
    }

    /// Log a scale request that the controller accepted
    pub fn log_scale_request(&self, direction: ScaleDirection, current: usize, target: usize) {
        let message = match direction {
            ScaleDirection::Out => "Added 1 new container",
            ScaleDirection::In => "Deleted 1 container",
        };
        info!(
            event = "scale_requested",
            app = %self.app,
            service = %self.service,
            direction = %direction,
            current_containers = current,
            target_containers = target,
            "{}",
            message
        );
    }

    /// Log a fired decision dropped at the container bound
    pub fn log_scale_suppressed(&self, direction: ScaleDirection, current: usize, limit: usize) {
        info!(
            event = "scale_suppressed",
            app = %self.app,
            service = %self.service,
            direction = %direction,
            current_containers = current,
            limit = limit,
            "Container limit reached, not scaling"
        );
    }

    /// Log a scale request the controller rejected
    pub fn log_scale_failed(&self, direction: ScaleDirection, target: usize, error: &str) {
        error!(
            event = "scale_failed",
            app = %self.app,
            service = %self.service,
            direction = %direction,
            target_containers = target,
            error = %error,
            "Failed to scale service"
        );
    }

    pub fn log_startup(&self, version: &str, periods: usize) {
        info!(
            event = "autoscaler_started",
            app = %self.app,
            service = %self.service,
            version = %version,
            periods = periods,
            "Autoscaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        warn!(
            event = "autoscaler_shutdown",
            app = %self.app,
            service = %self.service,
            reason = %reason,
            "Autoscaler shutting down"
        );
    }
}
