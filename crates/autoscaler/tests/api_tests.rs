//! Integration tests for the autoscaler API endpoints

use autoscaler_lib::{
    api::{create_router, AppState},
    collector::MetricsStore,
    health::{components, HealthRegistry},
    observability::ScalerMetrics,
    scaler::{ScaleDirection, ScalingConfig},
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::RECONCILER).await;
    health_registry.register(components::DECISION_ENGINE).await;

    let mut scaling = ScalingConfig::new("shop", "web");
    scaling.max_containers = 4;

    let state = Arc::new(AppState::new(
        health_registry,
        ScalerMetrics::new(),
        Arc::new(MetricsStore::new()),
        Arc::new(scaling),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["reconciler"].is_object());
    assert!(health["components"]["decision_engine"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_discovery_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::RECONCILER, "Discovery failed")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    // Degraded is still operational
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["reconciler"]["message"],
        "Discovery failed"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::DECISION_ENGINE, "Stopped")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_during_warmup() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"].is_string());
}

#[tokio::test]
async fn test_readyz_returns_ok_after_warmup() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::RECONCILER, "Failed")
        .await;

    let (status, _) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.set_containers_watched(2);
    state.metrics.set_window_sum(-1);
    state.metrics.inc_scale_requests(ScaleDirection::Out);
    state.metrics.observe_decision_latency(0.001);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("autoscaler_containers_watched"));
    assert!(metrics_text.contains("autoscaler_vote_window_sum"));
    assert!(metrics_text.contains("autoscaler_scale_requests_total{direction=\"scale_out\"}"));
    assert!(metrics_text.contains("autoscaler_decision_latency_seconds_bucket"));
}

#[tokio::test]
async fn test_status_lists_watched_containers() {
    let (app, state) = setup_test_app().await;

    let _a = state.store.upsert_watcher("a").unwrap();
    let _b = state.store.upsert_watcher("b").unwrap();
    state.store.set_metrics("a", 30.0, 2048.0);

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["app"], "shop");
    assert_eq!(body["service"], "web");
    assert_eq!(body["max_containers"], 4);

    let containers = body["containers"].as_array().unwrap();
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0]["id"], "a");
    assert_eq!(containers[0]["cpu_percent"], 30.0);
    assert_eq!(containers[0]["memory_bytes"], 2048.0);
    // Not yet primed
    assert!(containers[1]["cpu_percent"].is_null());

    assert_eq!(body["average_cpu_percent"], 30.0);
}

#[tokio::test]
async fn test_status_with_no_containers_has_null_averages() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["containers"].as_array().unwrap().is_empty());
    assert!(body["average_cpu_percent"].is_null());
    assert!(body["average_memory_bytes"].is_null());
}
