// =============================================================================
// Price Tracker (spec §4.9)
// =============================================================================
//
// Resolves every PENDING_TRACKING record against closed 1-minute candles.
// One task owns the active set; one subscriber task per symbol fans closed
// candles in from the gateway and evaluates every record that symbol has
// open. The tracker never produces user-visible output -- only the store is
// mutated.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::Gateway;
use crate::records::{AnalysisRecord, LifecycleState, Recommendation};
use crate::store::Store;
use crate::tracker::triple_barrier;
use crate::types::Timeframe;

const EXPIRY_SCAN_INTERVAL_SECS: u64 = 300;

#[derive(Clone)]
struct TrackedRecord {
    id: String,
    symbol: String,
    recommendation: Recommendation,
    entry: f64,
    created_at: i64,
    expires_at: i64,
    max_drawdown_percent: f64,
}

/// Shared tables the per-symbol subscriber tasks and the main tracker loop
/// both read and mutate.
struct TrackerState {
    active: DashMap<String, TrackedRecord>,
    by_symbol: DashMap<String, HashSet<String>>,
    gateway: Gateway,
    store: Store,
}

/// Spawn the price tracker. `enqueue_rx` carries record ids the orchestrator
/// best-effort enqueues right after a `PENDING_TRACKING` record is saved;
/// the tracker also rehydrates from `Store::get_open` on start-up so a
/// missed enqueue is never fatal.
pub fn spawn(gateway: Gateway, store: Store, mut enqueue_rx: mpsc::Receiver<String>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let state = Arc::new(TrackerState { active: DashMap::new(), by_symbol: DashMap::new(), gateway, store });

        match state.store.get_open().await {
            Ok(records) => {
                info!(count = records.len(), "seeding price tracker active set from store");
                for record in records {
                    add_active(&state, record).await;
                }
            }
            Err(err) => warn!(%err, "failed to seed tracker active set from store"),
        }

        let mut expiry_interval = tokio::time::interval(Duration::from_secs(EXPIRY_SCAN_INTERVAL_SECS));

        loop {
            tokio::select! {
                maybe_id = enqueue_rx.recv() => {
                    match maybe_id {
                        Some(id) => rehydrate_one(&state, &id).await,
                        None => {
                            info!("tracker enqueue channel closed, shutting down");
                            break;
                        }
                    }
                }
                _ = expiry_interval.tick() => {
                    run_expiry_scan(&state).await;
                }
                _ = shutdown.recv() => {
                    info!("price tracker shutting down");
                    break;
                }
            }
        }
    })
}

async fn rehydrate_one(state: &Arc<TrackerState>, id: &str) {
    match state.store.get_by_id(id).await {
        Ok(Some(record)) if record.state == LifecycleState::PendingTracking => add_active(state, record).await,
        Ok(_) => {}
        Err(err) => warn!(%err, id, "failed to load enqueued record"),
    }
}

async fn add_active(state: &Arc<TrackerState>, record: AnalysisRecord) {
    let symbol = record.symbol.clone();
    let tracked = TrackedRecord {
        id: record.id.clone(),
        symbol: symbol.clone(),
        entry: record.recommendation.entry.unwrap_or_default(),
        recommendation: record.recommendation,
        created_at: record.created_at,
        expires_at: record.expires_at,
        max_drawdown_percent: 0.0,
    };

    state.active.insert(tracked.id.clone(), tracked);

    let is_new_symbol = {
        let mut entry = state.by_symbol.entry(symbol.clone()).or_default();
        entry.insert(record.id.clone());
        entry.len() == 1
    };

    if is_new_symbol {
        spawn_symbol_subscriber(Arc::clone(state), symbol);
    }
}

fn spawn_symbol_subscriber(state: Arc<TrackerState>, symbol: String) {
    let mut rx = state.gateway.subscribe_closed_candles(&symbol, Timeframe::M1);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(candle) => on_closed_candle(&state, &symbol, &candle).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(symbol = %symbol, skipped, "tracker subscriber lagged behind candle stream");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(symbol = %symbol, "candle stream closed, subscriber exiting");
                    break;
                }
            }
        }
    });
}

async fn on_closed_candle(state: &Arc<TrackerState>, symbol: &str, candle: &crate::market::Kline) {
    let ids: Vec<String> = match state.by_symbol.get(symbol) {
        Some(set) => set.iter().cloned().collect(),
        None => return,
    };

    for id in ids {
        let Some(mut tracked) = state.active.get_mut(&id).map(|r| r.clone()) else { continue };

        let running_drawdown = if let Some(side) = tracked.recommendation.action.side() {
            triple_barrier::fold_max_drawdown(tracked.max_drawdown_percent, side, tracked.entry, candle)
        } else {
            tracked.max_drawdown_percent
        };

        match triple_barrier::evaluate_candle(&tracked.recommendation, tracked.entry, tracked.created_at, candle, running_drawdown) {
            Some(resolution) => {
                if let Err(err) = state.store.update_resolution(&id, &resolution).await {
                    warn!(%err, id, "failed to write resolution");
                    continue;
                }
                remove_active(state, &id, symbol);
            }
            None => {
                tracked.max_drawdown_percent = running_drawdown;
                state.active.insert(id, tracked);
            }
        }
    }
}

fn remove_active(state: &Arc<TrackerState>, id: &str, symbol: &str) {
    state.active.remove(id);
    let symbol_is_empty = {
        if let Some(mut set) = state.by_symbol.get_mut(symbol) {
            set.remove(id);
            set.is_empty()
        } else {
            true
        }
    };
    if symbol_is_empty {
        state.by_symbol.remove(symbol);
        state.gateway.unsubscribe_closed_candles(symbol, Timeframe::M1);
    }
}

/// Every 5 minutes, resolve any record whose `expires_at` has passed without
/// ever hitting SL or a TP (spec §4.9).
async fn run_expiry_scan(state: &Arc<TrackerState>) {
    let now = chrono::Utc::now().timestamp();
    let expired: Vec<TrackedRecord> = state.active.iter().filter(|r| r.expires_at < now).map(|r| r.clone()).collect();

    for tracked in expired {
        let ticker = match state.gateway.get_24h_ticker(&tracked.symbol).await {
            Ok(t) => t,
            Err(err) => {
                warn!(%err, symbol = %tracked.symbol, "failed to fetch last price for expiry resolution");
                continue;
            }
        };

        let resolution = triple_barrier::resolve_expired(&tracked.recommendation, tracked.entry, tracked.created_at, ticker.last_price, now, tracked.max_drawdown_percent);

        if let Err(err) = state.store.update_resolution(&tracked.id, &resolution).await {
            warn!(%err, id = %tracked.id, "failed to write expiry resolution");
            continue;
        }
        remove_active(state, &tracked.id, &tracked.symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_record_defaults_entry_to_zero_when_llm_omitted_it() {
        // entry is optional on Recommendation; the tracker degrades to a
        // zero-entry PnL% rather than refusing to track the position, since
        // SL/TP hit detection does not depend on entry at all.
        assert_eq!(Option::<f64>::None.unwrap_or_default(), 0.0);
    }
}
