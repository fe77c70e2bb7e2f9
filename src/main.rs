// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request Throttle Service
//!
//! Serves a small set of endpoints behind the per-client throttle:
//!
//! - 15 requests per 60 seconds per client address (default)
//! - 429 with `Retry-After` once a client's window is full
//! - Lifecycle counters at `/stats` and `/metrics`
//!
//! ## Configuration
//!
//! Configuration is loaded from an optional JSON file and environment
//! variables:
//!
//! - `CONFIG_FILE`: JSON config file path
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `THROTTLE_LIMIT`: Max requests per window per client (default: 15)
//! - `THROTTLE_WINDOW_SECS`: Window length in seconds (default: 60)
//! - `THROTTLE_SWEEP_SECS`: Idle-client eviction interval (default: 60)
//! - `THROTTLE_UNKNOWN_KEY`: Bucket for unidentifiable clients (default: unknown)
//! - `TRUSTED_PROXIES`: Comma-separated proxy IPs whose X-Forwarded-For is honoured

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use request_throttle::{
    config::Config,
    handlers::{router, AppState},
    middleware::ThrottleState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::load()?;
    info!(
        bind_addr = %config.bind_addr,
        limit = config.throttle.limit,
        window_secs = config.throttle.window_secs,
        trusted_proxies = config.throttle.trusted_proxies.len(),
        "Starting request throttle"
    );

    let throttle = Arc::new(ThrottleState::from_config(&config.throttle)?);
    let addr = config.socket_addr()?;
    let sweep_interval = config.throttle.sweep_interval()?;

    // Spawn sweep task
    let sweeper = throttle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let evicted = sweeper.sweep();
            debug!(evicted, "Sweep finished");
        }
    });

    let state = Arc::new(AppState { throttle, config });
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Request throttle stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
