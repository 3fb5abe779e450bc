// =============================================================================
// Market-Wide Scanner (spec §4.10)
// =============================================================================
//
// Every `market_scan_interval_secs`, pulls every symbol's 24h ticker in one
// request, keeps quote-USD pairs above the volume floor, and fires a daily-
// timeframe-only analysis for any symbol whose 1d RSI sits at or past an
// extreme. A per-symbol cooldown prevents the same symbol firing again
// before `market_scan_user_cooldown_secs` has elapsed.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::gateway::Gateway;
use crate::indicators::bundle::compute_snapshot;
use crate::orchestrator::AnalysisOrchestrator;
use crate::scanners::SCANNER_USER_ID;
use crate::types::{Timeframe, TradingStyle};

const DAILY_LOOKBACK_CANDLES: u32 = 60;
const RSI_OVERSOLD: f64 = 20.0;
const RSI_OVERBOUGHT: f64 = 80.0;

pub fn spawn(orchestrator: Arc<AnalysisOrchestrator>, gateway: Gateway, config: Arc<RuntimeConfig>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.market_scan_interval_secs));
        let cooldowns: Arc<DashMap<String, i64>> = Arc::new(DashMap::new());
        let semaphore = Arc::new(Semaphore::new(config.scanner_concurrency));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_sweep(&orchestrator, &gateway, &config, &cooldowns, &semaphore).await;
                }
                _ = shutdown.recv() => {
                    info!("market-wide scanner shutting down");
                    break;
                }
            }
        }
    })
}

#[instrument(skip_all)]
async fn run_sweep(
    orchestrator: &Arc<AnalysisOrchestrator>,
    gateway: &Gateway,
    config: &Arc<RuntimeConfig>,
    cooldowns: &Arc<DashMap<String, i64>>,
    semaphore: &Arc<Semaphore>,
) {
    let tickers = match gateway.get_all_24h_tickers().await {
        Ok(t) => t,
        Err(err) => {
            warn!(%err, "market-wide scanner: failed to fetch tickers");
            return;
        }
    };

    let candidates: Vec<String> = tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with("USDT") && t.quote_volume >= config.market_scan_min_quote_volume_usd)
        .map(|t| t.symbol)
        .collect();

    info!(candidates = candidates.len(), "market-wide scanner sweep starting");

    let now = chrono::Utc::now().timestamp();
    let mut handles = Vec::with_capacity(candidates.len());

    for symbol in candidates {
        if let Some(last) = cooldowns.get(&symbol) {
            if now - *last < config.market_scan_user_cooldown_secs {
                continue;
            }
        }

        let permit = Arc::clone(semaphore);
        let gw = gateway.clone();
        let cfg = Arc::clone(config);
        let orch = Arc::clone(orchestrator);
        let cooldowns = Arc::clone(cooldowns);

        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("scanner semaphore closed");
            evaluate_symbol(&orch, &gw, &cfg, &cooldowns, &symbol, now).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn evaluate_symbol(
    orchestrator: &Arc<AnalysisOrchestrator>,
    gateway: &Gateway,
    config: &Arc<RuntimeConfig>,
    cooldowns: &Arc<DashMap<String, i64>>,
    symbol: &str,
    now: i64,
) {
    let klines = match gateway.get_klines(symbol, Timeframe::D1, DAILY_LOOKBACK_CANDLES).await {
        Ok(k) => k,
        Err(err) => {
            warn!(%err, symbol, "market-wide scanner: kline fetch failed, skipping symbol");
            return;
        }
    };

    let snapshot = compute_snapshot(Timeframe::D1, &klines, config);
    let extreme = matches!(snapshot.rsi, Some(rsi) if rsi <= RSI_OVERSOLD || rsi >= RSI_OVERBOUGHT);

    if !extreme {
        return;
    }

    cooldowns.insert(symbol.to_string(), now);

    match orchestrator.analyze(SCANNER_USER_ID, symbol, Timeframe::D1, TradingStyle::Swing).await {
        Ok(record) => info!(symbol, rsi = ?snapshot.rsi, id = %record.id, "market-wide scanner fired analysis"),
        Err(err) => warn!(%err, symbol, "market-wide scanner: analysis failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_extremes_match_spec_thresholds() {
        assert!(RSI_OVERSOLD <= 20.0 && RSI_OVERBOUGHT >= 80.0);
    }
}
