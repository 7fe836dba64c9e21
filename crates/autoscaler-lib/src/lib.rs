//! Autoscaler library for container services
//!
//! This crate provides the core functionality for:
//! - Streaming per-container CPU and memory statistics
//! - Keeping stats watchers in sync with the running containers
//! - Voting on scale decisions over a sliding window
//! - Talking to the container controller API
//! - Health checks, metrics and the HTTP status API

pub mod api;
pub mod collector;
pub mod controller;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod scaler;

#[cfg(test)]
pub(crate) mod testing;

pub use error::WatchError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use scaler::ScalingConfig;
