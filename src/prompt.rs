// =============================================================================
// Prompt Assembler (spec §4.6)
// =============================================================================
//
// Builds the single text payload sent to the LLM client. The same inputs
// must always produce byte-identical text — temperature is the model's only
// source of variation, never the prompt — so every section below writes in
// a fixed field order with `write!` rather than iterating a HashMap.
// =============================================================================

use std::fmt::Write as _;

use crate::classifier::{AssetType, RiskBand};
use crate::gateway::Ticker24h;
use crate::indicators::bundle::{Consensus, IndicatorSnapshot, MultiTimeframeBundle};
use crate::records::LearningSummary;
use crate::types::{Timeframe, TradingStyle};

pub struct PromptInputs<'a> {
    pub symbol: &'a str,
    pub trading_style: TradingStyle,
    pub asset_type: AssetType,
    pub risk_band: RiskBand,
    pub bundle: &'a MultiTimeframeBundle,
    pub learning_summary: Option<&'a LearningSummary>,
    pub ticker: &'a Ticker24h,
    pub week_over_week_price_change_pct: Option<f64>,
    pub week_over_week_volume_change_pct: Option<f64>,
    /// Current-candle volume vs its trailing 20-candle average (spec §4.6
    /// item 4) — the same ratio the bot-activity scanner scores against.
    pub volume_vs_20candle_avg: Option<f64>,
    /// Absolute single-candle RSI swing, same source as the scanner.
    pub rsi_rate_of_change: Option<f64>,
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "null".to_string())
}

fn write_snapshot_section(out: &mut String, tf: Timeframe, snapshot: Option<&IndicatorSnapshot>) {
    let _ = writeln!(out, "### {tf}");
    match snapshot {
        None => {
            let _ = writeln!(out, "no data available for this timeframe");
        }
        Some(s) => {
            let _ = writeln!(out, "rsi: {} (prev: {})", fmt_opt(s.rsi), fmt_opt(s.rsi_prev));
            let _ = writeln!(out, "mfi: {} (prev: {})", fmt_opt(s.mfi), fmt_opt(s.mfi_prev));
            match &s.stochastic {
                Some(st) => {
                    let _ = writeln!(out, "stochastic: k={:.4} d={:.4}", st.k, st.d);
                }
                None => {
                    let _ = writeln!(out, "stochastic: null");
                }
            }
            let _ = writeln!(out, "atr: {}", fmt_opt(s.atr));
            let _ = writeln!(out, "consensus: {:?}", s.consensus);
            match &s.volume_profile {
                Some(vp) => {
                    let _ = writeln!(out, "volume_profile: poc={:.4} vah={:.4} val={:.4} position={:?}", vp.poc, vp.vah, vp.val, vp.position);
                }
                None => {
                    let _ = writeln!(out, "volume_profile: null");
                }
            }
            let _ = writeln!(out, "fair_value_gaps: {}", s.fair_value_gaps.len());
            let _ = writeln!(out, "order_blocks: {}", s.order_blocks.len());
            let _ = writeln!(out, "support_resistance_levels: {}", s.support_resistance.len());
            match &s.smc_structure {
                Some(structure) => {
                    let _ = writeln!(out, "smc_structure: bias={:?} last_event={:?}", structure.bias, structure.last_event);
                }
                None => {
                    let _ = writeln!(out, "smc_structure: null");
                }
            }
        }
    }
}

/// Assemble the full prompt text for `inputs`. Deterministic: identical
/// inputs always produce identical bytes.
pub fn assemble(inputs: &PromptInputs<'_>) -> String {
    let mut out = String::new();

    // 0. Asset-type block.
    let _ = writeln!(out, "== ASSET TYPE ==");
    let _ = writeln!(out, "symbol: {}", inputs.symbol);
    let _ = writeln!(out, "asset_type: {}", inputs.asset_type);
    let _ = writeln!(
        out,
        "position_pct: {:.2}-{:.2} stop_pct: {:.2}-{:.2} notes: {}",
        inputs.risk_band.min_position_pct, inputs.risk_band.max_position_pct,
        inputs.risk_band.min_stop_pct, inputs.risk_band.max_stop_pct, inputs.risk_band.notes
    );
    out.push('\n');

    // 1. Trading style.
    let _ = writeln!(out, "== TRADING STYLE ==");
    let _ = writeln!(out, "{}", inputs.trading_style);
    out.push('\n');

    // 2. Optional learning summary block (>= 3 resolved records).
    if let Some(summary) = inputs.learning_summary {
        if summary.total_count >= 3 {
            let _ = writeln!(out, "== LEARNING SUMMARY ==");
            let _ = writeln!(out, "total: {} wins: {} losses: {} win_rate: {:.4}", summary.total_count, summary.win_count, summary.loss_count, summary.win_rate);
            let _ = writeln!(out, "avg_win_pnl: {:.4} avg_loss_pnl: {:.4}", summary.avg_win_pnl, summary.avg_loss_pnl);
            let _ = writeln!(out, "similarity: {}", summary.similarity);
            out.push('\n');
        }
    }

    // 3. Indicator snapshot per timeframe.
    let _ = writeln!(out, "== INDICATOR SNAPSHOTS ==");
    for tf in Timeframe::BUNDLE_SET {
        write_snapshot_section(&mut out, tf, inputs.bundle.snapshots.get(&tf));
    }
    let _ = writeln!(out, "overall_consensus: {:?} strength: {}", inputs.bundle.overall_consensus, inputs.bundle.strength);
    out.push('\n');

    // 4. Pump/bot heuristics (spec §4.6 item 4) — null when there isn't
    // enough recent candle history to compute them, never a placeholder.
    let _ = writeln!(out, "== PUMP/BOT HEURISTICS ==");
    let _ = writeln!(out, "volume_vs_20candle_avg: {}", fmt_opt(inputs.volume_vs_20candle_avg));
    let _ = writeln!(out, "rsi_rate_of_change: {}", fmt_opt(inputs.rsi_rate_of_change));
    out.push('\n');

    // 5. 24h market block.
    let _ = writeln!(out, "== 24H MARKET ==");
    let _ = writeln!(
        out,
        "last_price: {:.8} high: {:.8} low: {:.8} change_pct: {:.4} quote_volume: {:.2}",
        inputs.ticker.last_price, inputs.ticker.high_price, inputs.ticker.low_price, inputs.ticker.price_change_pct, inputs.ticker.quote_volume
    );
    out.push('\n');

    // 6. Historical comparison block.
    let _ = writeln!(out, "== HISTORICAL COMPARISON ==");
    let _ = writeln!(out, "week_over_week_price_change_pct: {}", fmt_opt(inputs.week_over_week_price_change_pct));
    let _ = writeln!(out, "week_over_week_volume_change_pct: {}", fmt_opt(inputs.week_over_week_volume_change_pct));
    out.push('\n');

    // 7. Conditional macro block.
    let _ = writeln!(out, "== MACRO CONTEXT ==");
    if matches!(inputs.asset_type, AssetType::Btc) {
        let _ = writeln!(out, "template: dominance_institutional");
        let _ = writeln!(out, "dominance_pct: <fill>");
        let _ = writeln!(out, "institutional_flow_notes: <fill>");
    } else {
        let _ = writeln!(out, "template: correlation_sector");
        let _ = writeln!(out, "correlated_assets: <fill>");
        let _ = writeln!(out, "sector_notes: <fill>");
    }
    out.push('\n');

    // 8. Dynamic risk block.
    let _ = writeln!(out, "== RISK ==");
    let _ = writeln!(
        out,
        "position_pct: {:.2}-{:.2} stop_pct: {:.2}-{:.2} notes: {}",
        inputs.risk_band.min_position_pct, inputs.risk_band.max_position_pct,
        inputs.risk_band.min_stop_pct, inputs.risk_band.max_stop_pct, inputs.risk_band.notes
    );
    out.push('\n');

    // 9. Output-schema instruction (spec §6.5), strict JSON required.
    let _ = writeln!(out, "== OUTPUT SCHEMA ==");
    let _ = writeln!(
        out,
        "Respond with a single strict JSON object with exactly these top-level keys: \
         action, confidence, trading_style, entry_point, stop_loss, take_profit, \
         expected_holding_period, risk_level, asset_type, reasoning_vietnamese, key_points, \
         conflicting_signals, warnings, market_sentiment, technical_score, fundamental_score, \
         sector_analysis, correlation_analysis, fundamental_analysis, position_sizing_recommendation, \
         macro_context, historical_analysis. No prose outside the JSON object."
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ticker() -> Ticker24h {
        Ticker24h { symbol: "BTCUSDT".into(), price_change_pct: 1.0, last_price: 100.0, high_price: 105.0, low_price: 95.0, volume: 1000.0, quote_volume: 100_000.0 }
    }

    fn bundle() -> MultiTimeframeBundle {
        MultiTimeframeBundle { snapshots: HashMap::new(), overall_consensus: Consensus::Neutral, strength: 0 }
    }

    #[test]
    fn identical_inputs_produce_identical_text() {
        let t = ticker();
        let b = bundle();
        let inputs = PromptInputs {
            symbol: "BTCUSDT",
            trading_style: TradingStyle::Swing,
            asset_type: AssetType::Btc,
            risk_band: AssetType::Btc.risk_band(),
            bundle: &b,
            learning_summary: None,
            ticker: &t,
            week_over_week_price_change_pct: Some(2.0),
            week_over_week_volume_change_pct: None,
            volume_vs_20candle_avg: None,
            rsi_rate_of_change: None,
        };
        assert_eq!(assemble(&inputs), assemble(&inputs));
    }

    #[test]
    fn btc_gets_dominance_template() {
        let t = ticker();
        let b = bundle();
        let inputs = PromptInputs {
            symbol: "BTCUSDT",
            trading_style: TradingStyle::Swing,
            asset_type: AssetType::Btc,
            risk_band: AssetType::Btc.risk_band(),
            bundle: &b,
            learning_summary: None,
            ticker: &t,
            week_over_week_price_change_pct: None,
            week_over_week_volume_change_pct: None,
            volume_vs_20candle_avg: None,
            rsi_rate_of_change: None,
        };
        assert!(assemble(&inputs).contains("dominance_institutional"));
    }

    #[test]
    fn alt_gets_correlation_template() {
        let t = ticker();
        let b = bundle();
        let inputs = PromptInputs {
            symbol: "SOLUSDT",
            trading_style: TradingStyle::Scalping,
            asset_type: AssetType::LargeCapAlt,
            risk_band: AssetType::LargeCapAlt.risk_band(),
            bundle: &b,
            learning_summary: None,
            ticker: &t,
            week_over_week_price_change_pct: None,
            week_over_week_volume_change_pct: None,
            volume_vs_20candle_avg: None,
            rsi_rate_of_change: None,
        };
        assert!(assemble(&inputs).contains("correlation_sector"));
    }

    #[test]
    fn learning_summary_omitted_below_three_records() {
        let t = ticker();
        let b = bundle();
        let summary = LearningSummary::no_data();
        let inputs = PromptInputs {
            symbol: "BTCUSDT",
            trading_style: TradingStyle::Swing,
            asset_type: AssetType::Btc,
            risk_band: AssetType::Btc.risk_band(),
            bundle: &b,
            learning_summary: Some(&summary),
            ticker: &t,
            week_over_week_price_change_pct: None,
            week_over_week_volume_change_pct: None,
            volume_vs_20candle_avg: None,
            rsi_rate_of_change: None,
        };
        assert!(!assemble(&inputs).contains("LEARNING SUMMARY"));
    }
}
