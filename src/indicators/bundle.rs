// =============================================================================
// Multi-timeframe indicator bundle and consensus
// =============================================================================
//
// Each timeframe in `Timeframe::BUNDLE_SET` gets its own `IndicatorSnapshot`:
// RSI/MFI/Stochastic always, ATR whenever there's enough history, and the
// institutional indicators (volume profile, FVGs, order blocks,
// support/resistance, SMC structure) only once `institutional_min_candles`
// closed candles are available — they are noisy on thin history.
//
// Per-timeframe consensus: RSI and MFI both <= 20 votes BUY, both >= 80
// votes SELL, anything else is NEUTRAL. The overall bundle consensus is a
// majority vote over `Timeframe::CONSENSUS_SET` (the four coarsest
// timeframes — M1 never participates in the vote); `strength` is the
// winning side's vote count out of four.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::indicators::atr::calculate_atr;
use crate::indicators::fvg::{self, FairValueGap};
use crate::indicators::mfi::current_mfi;
use crate::indicators::order_block::{self, OrderBlock};
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::smc::{self, SmcStructure};
use crate::indicators::stochastic::{current_stochastic, StochasticValue};
use crate::indicators::support_resistance::{self, Level};
use crate::indicators::volume_profile::{self, VolumeProfile};
use crate::market::Kline;
use crate::types::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consensus {
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timeframe: Timeframe,
    pub rsi: Option<f64>,
    pub rsi_prev: Option<f64>,
    pub mfi: Option<f64>,
    pub mfi_prev: Option<f64>,
    pub stochastic: Option<StochasticValue>,
    pub atr: Option<f64>,
    pub consensus: Consensus,
    pub volume_profile: Option<VolumeProfile>,
    pub fair_value_gaps: Vec<FairValueGap>,
    pub order_blocks: Vec<OrderBlock>,
    pub support_resistance: Vec<Level>,
    pub smc_structure: Option<SmcStructure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTimeframeBundle {
    pub snapshots: HashMap<Timeframe, IndicatorSnapshot>,
    pub overall_consensus: Consensus,
    pub strength: u8,
}

fn vote(rsi: Option<f64>, mfi: Option<f64>) -> Consensus {
    match (rsi, mfi) {
        (Some(r), Some(m)) if r <= 20.0 && m <= 20.0 => Consensus::Buy,
        (Some(r), Some(m)) if r >= 80.0 && m >= 80.0 => Consensus::Sell,
        _ => Consensus::Neutral,
    }
}

/// Compute the indicator snapshot for a single timeframe's closed candles.
pub fn compute_snapshot(timeframe: Timeframe, klines: &[Kline], config: &RuntimeConfig) -> IndicatorSnapshot {
    let hlcc4_series = klines.iter().map(|k| k.hlcc4()).collect::<Vec<_>>();

    let rsi_series = calculate_rsi(&hlcc4_series, config.rsi_period);
    let rsi = rsi_series.last().copied();
    let rsi_prev = if rsi_series.len() >= 2 { Some(rsi_series[rsi_series.len() - 2]) } else { None };

    let mfi = current_mfi(klines, config.mfi_period);
    let mfi_prev = {
        let trimmed = if klines.len() > 1 { &klines[..klines.len() - 1] } else { &[] };
        current_mfi(trimmed, config.mfi_period)
    };

    let stochastic = current_stochastic(klines, config.stoch_period, config.stoch_smoothing);
    let atr = calculate_atr(klines, config.atr_period);
    let consensus = vote(rsi, mfi);

    let (volume_profile, fair_value_gaps, order_blocks, support_resistance, smc_structure) =
        if klines.len() >= config.institutional_min_candles {
            (
                volume_profile::compute_volume_profile(
                    klines,
                    config.volume_profile_bins,
                    config.volume_profile_value_area_pct,
                ),
                fvg::detect_fair_value_gaps(klines),
                order_block::detect_order_blocks(klines, config.atr_period, config.order_block_atr_multiplier),
                support_resistance::find_levels(klines, config.pivot_window, config.pivot_cluster_pct),
                smc::compute_structure(klines),
            )
        } else {
            (None, Vec::new(), Vec::new(), Vec::new(), None)
        };

    IndicatorSnapshot {
        timeframe,
        rsi,
        rsi_prev,
        mfi,
        mfi_prev,
        stochastic,
        atr,
        consensus,
        volume_profile,
        fair_value_gaps,
        order_blocks,
        support_resistance,
        smc_structure,
    }
}

/// Assemble the full multi-timeframe bundle from a per-timeframe map of
/// closed klines (oldest first). Missing timeframes are simply absent from
/// `snapshots` and are excluded from the consensus vote.
pub fn compute_bundle(series_by_timeframe: &HashMap<Timeframe, Vec<Kline>>, config: &RuntimeConfig) -> MultiTimeframeBundle {
    let mut snapshots = HashMap::new();

    for &tf in &Timeframe::BUNDLE_SET {
        if let Some(klines) = series_by_timeframe.get(&tf) {
            snapshots.insert(tf, compute_snapshot(tf, klines, config));
        }
    }

    let mut buy = 0u8;
    let mut sell = 0u8;
    let mut neutral = 0u8;

    for &tf in &Timeframe::CONSENSUS_SET {
        match snapshots.get(&tf).map(|s| s.consensus) {
            Some(Consensus::Buy) => buy += 1,
            Some(Consensus::Sell) => sell += 1,
            _ => neutral += 1,
        }
    }

    let (overall_consensus, strength) = if buy > sell && buy > neutral {
        (Consensus::Buy, buy)
    } else if sell > buy && sell > neutral {
        (Consensus::Sell, sell)
    } else {
        (Consensus::Neutral, neutral.max(buy).max(sell))
    };

    MultiTimeframeBundle { snapshots, overall_consensus, strength }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(close: f64) -> Kline {
        Kline::new(0, 59_999, close, close + 1.0, close - 1.0, close, 100.0, 100.0 * close, 10, 50.0, 50.0 * close)
    }

    #[test]
    fn snapshot_omits_institutional_indicators_below_threshold() {
        let config = RuntimeConfig::default();
        let klines: Vec<Kline> = (0..30).map(|i| k(100.0 + i as f64)).collect();
        let snapshot = compute_snapshot(Timeframe::H4, &klines, &config);
        assert!(snapshot.volume_profile.is_none());
        assert!(snapshot.fair_value_gaps.is_empty());
        assert!(snapshot.smc_structure.is_none());
    }

    #[test]
    fn snapshot_includes_institutional_indicators_above_threshold() {
        let mut config = RuntimeConfig::default();
        config.institutional_min_candles = 30;
        let klines: Vec<Kline> = (0..210).map(|i| k(100.0 + (i % 20) as f64)).collect();
        let snapshot = compute_snapshot(Timeframe::H4, &klines, &config);
        assert!(snapshot.volume_profile.is_some());
    }

    #[test]
    fn bundle_consensus_is_buy_when_majority_oversold() {
        let config = RuntimeConfig::default();
        let falling: Vec<Kline> = (0..30).map(|i| k(200.0 - i as f64)).collect();
        let flat: Vec<Kline> = (0..30).map(|_| k(100.0)).collect();

        let mut series = HashMap::new();
        series.insert(Timeframe::M5, falling.clone());
        series.insert(Timeframe::H1, falling.clone());
        series.insert(Timeframe::H4, falling);
        series.insert(Timeframe::D1, flat);

        let bundle = compute_bundle(&series, &config);
        assert_eq!(bundle.overall_consensus, Consensus::Buy);
        assert_eq!(bundle.strength, 3);
    }

    #[test]
    fn missing_timeframes_count_as_neutral() {
        let config = RuntimeConfig::default();
        let series = HashMap::new();
        let bundle = compute_bundle(&series, &config);
        assert_eq!(bundle.overall_consensus, Consensus::Neutral);
        assert!(bundle.snapshots.is_empty());
    }
}
