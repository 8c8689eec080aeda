//! Live-Class Session Controller
//!
//! Authoritative state service for live-class collaboration: shared
//! whiteboard and annotation surfaces, breakout rooms, hand-raise queue,
//! live polls and session recording.
//!
//! # Servers
//!
//! - HTTP server for health endpoints and Prometheus metrics
//!   (default: 0.0.0.0:8081)
//!
//! # Architecture
//!
//! Uses an actor model hierarchy:
//! - `ClassControllerActor` (singleton): supervises sessions
//! - `SessionActor` (per live class): owns all session state, serializes
//!   every mutation and broadcasts sequence-numbered deltas
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`ClassControllerActorHandle`)
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use session_controller::actors::{
    ActorMetrics, ClassControllerActorHandle, ControllerMetrics, SessionLimits,
};
use session_controller::config::Config;
use session_controller::media::NullCaptureProvider;
use session_controller::observability::{health_router, HealthState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Live-Class Session Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        health_bind_address = %config.health_bind_address,
        max_sessions = config.max_sessions,
        max_participants_per_session = config.max_participants_per_session,
        event_channel_buffer = config.event_channel_buffer,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder.
    // This must happen before any metrics are recorded.
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        format!("Failed to install Prometheus metrics recorder: {e}")
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let controller_metrics = ControllerMetrics::new();

    // No capture backend is wired in yet; recording degrades gracefully
    // with CaptureUnavailable until a real provider is attached.
    let media_provider = Arc::new(NullCaptureProvider);

    let controller_handle = ClassControllerActorHandle::new(
        config.instance_id.clone(),
        Arc::clone(&actor_metrics),
        Arc::clone(&controller_metrics),
        media_provider,
        config.max_sessions,
        SessionLimits {
            max_participants: config.max_participants_per_session,
            event_channel_buffer: config.event_channel_buffer,
        },
    );
    info!("Actor system initialized");

    // Shutdown token as child of the controller's token
    let shutdown_token = controller_handle.child_token();

    // Start health HTTP server (must succeed - fail startup if it doesn't).
    // This provides liveness/readiness probes and the Prometheus /metrics
    // endpoint.
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_router = health_router(Arc::clone(&health_state));
    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router.merge(metrics_router);

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %health_addr, "Health server started");

    // Controller is up and accepting sessions
    health_state.set_ready();

    // Wait for shutdown signal
    info!("Session Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    // Trigger graceful shutdown; the cancellation propagates to every
    // session actor and the health server.
    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    if let Err(e) = controller_handle.shutdown().await {
        warn!(error = %e, "Actor system shutdown error");
    }

    info!("Session Controller shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
