// =============================================================================
// Bot-Activity Scanner (spec §4.10)
// =============================================================================
//
// Every `bot_scan_interval_secs`, scores each watched symbol on a 0-100
// scale from its recent 5-minute candle/volume profile — the same raw
// signals the prompt assembler's "pump/bot heuristics" block names (spec
// §4.6 item 4): current-candle volume against its 20-candle average, and
// RSI rate-of-change. Symbols above the threshold get a full analysis.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::gateway::Gateway;
use crate::indicators::bundle::compute_snapshot;
use crate::market::Kline;
use crate::orchestrator::AnalysisOrchestrator;
use crate::scanners::SCANNER_USER_ID;
use crate::types::{Timeframe, TradingStyle};

const LOOKBACK_CANDLES: u32 = 40;
const VOLUME_WINDOW: usize = 20;
/// Volume-ratio contribution caps out once the current candle trades at
/// 5x its trailing 20-candle average.
const VOLUME_RATIO_CAP: f64 = 5.0;
const VOLUME_WEIGHT: f64 = 70.0;
/// RSI-rate-of-change contribution caps out at a 20-point single-candle swing.
const RSI_ROC_CAP: f64 = 20.0;
const RSI_ROC_WEIGHT: f64 = 30.0;

pub fn spawn(orchestrator: Arc<AnalysisOrchestrator>, gateway: Gateway, config: Arc<RuntimeConfig>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.bot_scan_interval_secs));
        let semaphore = Arc::new(Semaphore::new(config.scanner_concurrency));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_sweep(&orchestrator, &gateway, &config, &semaphore).await;
                }
                _ = shutdown.recv() => {
                    info!("bot-activity scanner shutting down");
                    break;
                }
            }
        }
    })
}

#[instrument(skip_all)]
async fn run_sweep(orchestrator: &Arc<AnalysisOrchestrator>, gateway: &Gateway, config: &Arc<RuntimeConfig>, semaphore: &Arc<Semaphore>) {
    let symbols = config.symbols.clone();
    info!(count = symbols.len(), "bot-activity scanner sweep starting");

    let mut handles = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let permit = Arc::clone(semaphore);
        let gw = gateway.clone();
        let cfg = Arc::clone(config);
        let orch = Arc::clone(orchestrator);

        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("scanner semaphore closed");
            evaluate_symbol(&orch, &gw, &cfg, &symbol).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn evaluate_symbol(orchestrator: &Arc<AnalysisOrchestrator>, gateway: &Gateway, config: &Arc<RuntimeConfig>, symbol: &str) {
    let klines = match gateway.get_klines(symbol, Timeframe::M5, LOOKBACK_CANDLES).await {
        Ok(k) => k,
        Err(err) => {
            warn!(%err, symbol, "bot-activity scanner: kline fetch failed, skipping symbol");
            return;
        }
    };

    let snapshot = compute_snapshot(Timeframe::M5, &klines, config);
    let score = heuristic_score(&klines, snapshot.rsi, snapshot.rsi_prev);

    if score <= config.bot_activity_score_threshold {
        return;
    }

    match orchestrator.analyze(SCANNER_USER_ID, symbol, Timeframe::M5, TradingStyle::Scalping).await {
        Ok(record) => info!(symbol, score, id = %record.id, "bot-activity scanner fired analysis"),
        Err(err) => warn!(%err, symbol, score, "bot-activity scanner: analysis failed"),
    }
}

/// Combines current-candle-vs-20-candle-average volume ratio with single-
/// candle RSI rate-of-change into a 0-100 score. Needs at least
/// `VOLUME_WINDOW + 1` closed candles; returns 0 otherwise.
fn heuristic_score(klines: &[Kline], rsi: Option<f64>, rsi_prev: Option<f64>) -> f64 {
    if klines.len() < VOLUME_WINDOW + 1 {
        return 0.0;
    }

    let volume_ratio = volume_vs_trailing_average(klines).unwrap_or(0.0);
    let volume_score = ((volume_ratio - 1.0).max(0.0) / (VOLUME_RATIO_CAP - 1.0) * VOLUME_WEIGHT).min(VOLUME_WEIGHT);

    let rsi_roc = rsi_rate_of_change(rsi, rsi_prev).unwrap_or(0.0);
    let rsi_score = (rsi_roc / RSI_ROC_CAP * RSI_ROC_WEIGHT).min(RSI_ROC_WEIGHT);

    volume_score + rsi_score
}

/// Current-candle volume divided by the trailing `VOLUME_WINDOW`-candle
/// average (spec §4.6 item 4). `None` below `VOLUME_WINDOW + 1` candles or
/// when the trailing average is zero. Shared with the prompt assembler so
/// the "pump/bot heuristics" block reports the same number this scanner
/// scores against.
pub fn volume_vs_trailing_average(klines: &[Kline]) -> Option<f64> {
    if klines.len() < VOLUME_WINDOW + 1 {
        return None;
    }
    let current_volume = klines[klines.len() - 1].volume;
    let trailing: f64 = klines[klines.len() - 1 - VOLUME_WINDOW..klines.len() - 1].iter().map(|k| k.volume).sum::<f64>() / VOLUME_WINDOW as f64;
    if trailing > 0.0 {
        Some(current_volume / trailing)
    } else {
        None
    }
}

/// Absolute single-candle RSI swing between the current and previous
/// reading. `None` if either side is unavailable.
pub fn rsi_rate_of_change(rsi: Option<f64>, rsi_prev: Option<f64>) -> Option<f64> {
    match (rsi, rsi_prev) {
        (Some(r), Some(p)) => Some((r - p).abs()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Kline;

    fn candle_with_volume(volume: f64) -> Kline {
        Kline::new(0, 1, 1.0, 1.0, 1.0, 1.0, volume, volume, 1, 0.0, 0.0)
    }

    #[test]
    fn flat_volume_and_flat_rsi_scores_zero() {
        let klines: Vec<Kline> = (0..=VOLUME_WINDOW).map(|_| candle_with_volume(100.0)).collect();
        assert_eq!(heuristic_score(&klines, Some(50.0), Some(50.0)), 0.0);
    }

    #[test]
    fn volume_spike_with_rsi_jump_scores_high() {
        let mut klines: Vec<Kline> = (0..VOLUME_WINDOW).map(|_| candle_with_volume(100.0)).collect();
        klines.push(candle_with_volume(600.0));
        let score = heuristic_score(&klines, Some(75.0), Some(50.0));
        assert!(score > 70.0, "expected a high score, got {score}");
    }

    #[test]
    fn insufficient_history_scores_zero() {
        let klines: Vec<Kline> = (0..5).map(|_| candle_with_volume(100.0)).collect();
        assert_eq!(heuristic_score(&klines, Some(90.0), Some(10.0)), 0.0);
    }
}
