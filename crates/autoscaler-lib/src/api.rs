//! HTTP API for health checks, Prometheus metrics and scaling status

use crate::collector::MetricsStore;
use crate::health::{ComponentStatus, HealthRegistry};
use crate::observability::ScalerMetrics;
use crate::scaler::ScalingConfig;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ScalerMetrics,
    pub store: Arc<MetricsStore>,
    pub scaling: Arc<ScalingConfig>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ScalerMetrics,
        store: Arc<MetricsStore>,
        scaling: Arc<ScalingConfig>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            store,
            scaling,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContainerStatus {
    pub id: String,
    /// `None` until the watcher has seen two samples, or when the value is not finite
    pub cpu_percent: Option<f64>,
    pub memory_bytes: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub app: String,
    pub service: String,
    pub min_containers: usize,
    pub max_containers: usize,
    pub containers: Vec<ContainerStatus>,
    pub average_cpu_percent: Option<f64>,
    pub average_memory_bytes: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// 200 once the decision engine is voting, 503 before
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Watched containers with their latest readings
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshot = state.store.snapshot();

    let containers = snapshot
        .container_ids
        .iter()
        .map(|id| ContainerStatus {
            id: id.clone(),
            cpu_percent: snapshot.cpu.get(id).copied().and_then(finite),
            memory_bytes: snapshot.memory.get(id).copied().and_then(finite),
        })
        .collect();

    Json(StatusResponse {
        app: state.scaling.app.clone(),
        service: state.scaling.service.clone(),
        min_containers: state.scaling.min_containers,
        max_containers: state.scaling.max_containers,
        containers,
        average_cpu_percent: finite(snapshot.average_cpu()),
        average_memory_bytes: finite(snapshot.average_memory()),
    })
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve the API until the process exits
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
