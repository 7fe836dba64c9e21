//! Container autoscaler
//!
//! Watches the CPU and memory of every container of one service and asks the
//! controller to add or remove a container once utilization has stayed past
//! a threshold for several consecutive periods.

use anyhow::Result;
use autoscaler_lib::{
    api::{self, AppState},
    collector::{MetricsStore, ReconcileLoopBuilder},
    controller::{ControllerClient, ControllerConfig},
    health::{components, HealthRegistry},
    observability::{ScalerMetrics, StructuredLogger},
    scaler::{DecisionEngine, EngineConfig},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting container autoscaler");

    let config = config::AutoscalerConfig::load()?;
    let scaling = Arc::new(config.scaling());
    info!(
        app = %scaling.app,
        service = %scaling.service,
        controller = %config.controller_addr,
        "Autoscaler configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RECONCILER).await;
    health_registry.register(components::DECISION_ENGINE).await;

    let metrics = ScalerMetrics::new();
    let logger = StructuredLogger::new(&scaling.app, &scaling.service);
    logger.log_startup(AUTOSCALER_VERSION, scaling.periods);

    let controller = Arc::new(ControllerClient::new(ControllerConfig::new(
        config.controller_addr.clone(),
        config.api_key.clone(),
    ))?);
    let store = Arc::new(MetricsStore::new());

    let (shutdown_tx, _) = broadcast::channel(1);

    let reconciler = ReconcileLoopBuilder::new()
        .scaling(scaling.clone())
        .discovery(controller.clone())
        .stats(controller.clone())
        .store(store.clone())
        .health(health_registry.clone())
        .interval(config.reconcile_interval())
        .build()?;
    let reconcile_handle = tokio::spawn(reconciler.run(shutdown_tx.subscribe()));

    let engine = DecisionEngine::new(
        scaling.clone(),
        store.clone(),
        controller,
        EngineConfig {
            interval: config.decision_interval(),
        },
    )
    .with_health(health_registry.clone());
    let engine_handle = tokio::spawn(engine.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(AppState::new(health_registry, metrics, store, scaling));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = tokio::join!(reconcile_handle, engine_handle);
    info!("Shutdown complete");

    Ok(())
}
