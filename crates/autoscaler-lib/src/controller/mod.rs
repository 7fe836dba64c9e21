//! Container controller API
//!
//! The controller owns the running containers. It is used for three things:
//! listing a service's containers, streaming each container's stats, and
//! changing the service's container count.

mod client;

pub use client::{ControllerClient, ControllerConfig};
