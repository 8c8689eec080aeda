//! Observability: health endpoints for the session controller.
//!
//! The `/metrics` endpoint is served separately via
//! `metrics-exporter-prometheus`; actor-level metrics live in
//! [`crate::actors::metrics`].

pub mod health;

pub use health::{health_router, HealthState};
