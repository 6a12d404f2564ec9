//! teleop-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints. On
//! Ctrl-C / SIGTERM every live session is stopped before exit.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use teleop_gateway::bridge::SessionManager;
use teleop_gateway::config::BridgeConfig;
use teleop_gateway::{build_app, build_state, bus};

/// Upper bound on stopping all sessions at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = BridgeConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        rate_limit_hz = config.rate_limit_hz,
        watchdog_ms = u64::try_from(config.watchdog_timeout.as_millis()).unwrap_or(u64::MAX),
        bus = ?config.bus_endpoint,
        "starting teleop-gateway"
    );

    let state = build_state(&config, bus::from_config(&config));
    let sessions = Arc::clone(&state.sessions);
    let app = build_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after every session has been stopped.
async fn shutdown_signal(sessions: Arc<SessionManager>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown requested");
    if !sessions.shutdown(SHUTDOWN_DRAIN).await {
        tracing::warn!("some sessions did not finish teardown before exit");
    }
}
