// =============================================================================
// Market Pulse: Main Entry Point
// =============================================================================
//
// Serves market snapshots and technical indicators over HTTP, shielding the
// upstream providers behind per-client rate limits, short-lived caches and
// retrying fetches.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod cache;
mod error;
mod indicators;
mod insights;
mod orchestrator;
mod rate_limit;
mod runtime_config;
mod types;
mod upstream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::{ServiceConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use crate::upstream::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Market Pulse starting up");

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = ServiceConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ServiceConfig::default()
    });
    config.apply_env_overrides();

    info!(
        snapshot_limit = config.snapshot_limit.limit,
        indicator_limit = config.indicator_limit.limit,
        indicator_retries = config.indicator_limit.max_retries,
        fetch_retries = config.fetch_retry.max_retries,
        indicator_mode = %config.indicator_mode,
        "Request shaping configured"
    );

    // ── 2. Shared state ──────────────────────────────────────────────────
    let transport = HttpTransport::new(Duration::from_secs(config.upstream_timeout_secs))?;
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(transport),
        types::system_clock(),
    ));

    // ── 3. Idle sweep ────────────────────────────────────────────────────
    let sweep_state = state.clone();
    let sweep_every = Duration::from_secs(config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = sweep_state.orchestrator.sweep();
            if report.idle_clients > 0 || report.stale_entries > 0 {
                info!(
                    idle_clients = report.idle_clients,
                    stale_entries = report.stale_entries,
                    "swept idle state"
                );
            } else {
                debug!("sweep found nothing to remove");
            }
        }
    });

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    info!("Market Pulse shut down complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    warn!("Shutdown signal received, draining in-flight requests");
}
