// =============================================================================
// Aurora Signal Engine — Main Entry Point
// =============================================================================
//
// Composition root: build the gateway, store, and LLM client once, wire them
// into the orchestrator, then spawn the price tracker, the two scanners, the
// hourly store-purge task, and the ops HTTP server as independent tasks that
// all share one shutdown broadcast.
// =============================================================================

mod api;
mod app_state;
mod classifier;
mod config;
mod error;
mod gateway;
mod indicators;
mod learning;
mod llm;
mod market;
mod orchestrator;
mod prompt;
mod records;
mod scanners;
mod store;
mod tracker;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::RuntimeConfig;
use crate::gateway::Gateway;
use crate::llm::LLMClient;
use crate::orchestrator::AnalysisOrchestrator;
use crate::store::Store;

const TRACKER_ENQUEUE_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Aurora signal engine starting up");

    let config = Arc::new(RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    }));

    info!(symbols = ?config.symbols, "watched symbols configured");

    // ── Shared infrastructure ────────────────────────────────────────────
    let gateway = Gateway::new(config.exchange_rest_base.clone(), config.exchange_ws_base.clone(), config.rest_timeout_secs, config.rate_limit_weight_per_min);

    let store = Store::connect(&config.db_path, config.db_pool_min_connections, config.db_pool_max_connections).await?;

    let llm = Arc::new(LLMClient::new(
        config.llm_endpoint.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        config.llm_timeout_secs,
        config.llm_max_concurrent,
        config.llm_min_interval_ms,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (tracker_tx, tracker_rx) = mpsc::channel::<String>(TRACKER_ENQUEUE_CHANNEL_CAPACITY);

    let orchestrator = Arc::new(AnalysisOrchestrator::new(gateway.clone(), llm, store.clone(), Arc::clone(&config), tracker_tx));

    // ── Price tracker ─────────────────────────────────────────────────────
    let tracker_handle = tracker::monitor::spawn(gateway.clone(), store.clone(), tracker_rx, shutdown_tx.subscribe());

    // ── Store purge loop ──────────────────────────────────────────────────
    let purge_handle = store::spawn_purge_task(store.clone(), shutdown_tx.subscribe());

    // ── Scanners ──────────────────────────────────────────────────────────
    let mut scanner_handles = Vec::new();
    if config.enable_market_wide_scanner {
        scanner_handles.push(scanners::market_wide::spawn(Arc::clone(&orchestrator), gateway.clone(), Arc::clone(&config), shutdown_tx.subscribe()));
    }
    if config.enable_bot_activity_scanner {
        scanner_handles.push(scanners::bot_activity::spawn(Arc::clone(&orchestrator), gateway.clone(), Arc::clone(&config), shutdown_tx.subscribe()));
    }

    // ── Ops HTTP server ───────────────────────────────────────────────────
    let app_state = AppState::new(Arc::clone(&orchestrator), store.clone(), Arc::clone(&config));
    let bind_addr = std::env::var("AURORA_SIGNAL_ENGINE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "ops API listening");

    let (stop_accepting_tx, stop_accepting_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        let app = api::rest::router(app_state);
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_accepting_rx.await;
            })
            .await
    });

    info!("all subsystems running, awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — draining");

    // Step 1: stop accepting new HTTP connections immediately.
    let _ = stop_accepting_tx.send(());

    // Step 2: give in-flight requests up to shutdown_drain_secs to finish.
    match tokio::time::timeout(Duration::from_secs(config.shutdown_drain_secs), server_handle).await {
        Ok(Ok(Ok(()))) => info!("ops API drained cleanly"),
        Ok(Ok(Err(err))) => warn!(%err, "ops API server exited with an error"),
        Ok(Err(err)) => warn!(%err, "ops API server task panicked"),
        Err(_) => warn!(secs = config.shutdown_drain_secs, "ops API drain deadline exceeded, continuing shutdown"),
    }

    // Step 3: tear down websocket streams (tracker + scanners stop via the
    // same broadcast; the tracker's per-symbol subscriber tasks unwind as
    // their shutdown receivers fire).
    let _ = shutdown_tx.send(());
    let _ = tracker_handle.await;
    let _ = purge_handle.await;
    for handle in scanner_handles {
        let _ = handle.await;
    }

    // Step 4: flush the DB pool.
    store.close().await;

    info!("aurora signal engine shut down complete");
    Ok(())
}
