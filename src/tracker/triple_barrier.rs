// =============================================================================
// Triple-barrier resolution (spec §4.9)
// =============================================================================
//
// Pure resolution logic: given a recommendation's fixed SL/TP array and one
// closed candle, decide whether the record resolves on this bar. No state
// machine, no progressive tightening -- the barrier is fixed at the level the
// LLM proposed when the record was created.
// =============================================================================

use crate::market::Kline;
use crate::records::{ExitReason, Outcome, Recommendation, Resolution};
use crate::types::Side;

/// Evaluate one closed candle against `recommendation`'s fixed barriers.
/// Returns `None` when neither the stop-loss nor any take-profit triggers on
/// this bar.
pub fn evaluate_candle(recommendation: &Recommendation, entry: f64, created_at: i64, candle: &Kline, running_max_drawdown_percent: f64) -> Option<Resolution> {
    let side = recommendation.action.side()?;
    let stop_loss = recommendation.stop_loss?;
    let take_profits = &recommendation.take_profit;

    let (sl_triggered, highest_tp_hit) = match side {
        Side::Buy => {
            let sl = candle.low <= stop_loss;
            let highest = take_profits.iter().enumerate().filter(|(_, tp)| candle.high >= **tp).map(|(i, _)| i + 1).max();
            (sl, highest)
        }
        Side::Sell => {
            let sl = candle.high >= stop_loss;
            let highest = take_profits.iter().enumerate().filter(|(_, tp)| candle.low <= **tp).map(|(i, _)| i + 1).max();
            (sl, highest)
        }
    };

    if !sl_triggered && highest_tp_hit.is_none() {
        return None;
    }

    let mut tp_hits = vec![false; take_profits.len()];

    // Tie-break: SL and a TP on the same bar both resolve as SL (worst case;
    // intrabar order is unknown).
    let (outcome, exit_reason, exit_price, sl_hit) = if sl_triggered {
        (Outcome::Loss, ExitReason::SlHit, stop_loss, true)
    } else {
        let k = highest_tp_hit.expect("checked above");
        for hit in tp_hits.iter_mut().take(k) {
            *hit = true;
        }
        (Outcome::Win, ExitReason::take_profit(k), take_profits[k - 1], false)
    };

    let pnl_percent = match side {
        Side::Buy => (exit_price - entry) / entry * 100.0,
        Side::Sell => (entry - exit_price) / entry * 100.0,
    };

    let max_drawdown_percent = fold_max_drawdown(running_max_drawdown_percent, side, entry, candle);

    Some(Resolution {
        outcome,
        exit_reason,
        exit_price,
        pnl_percent,
        duration_secs: candle.close_time / 1000 - created_at,
        max_drawdown_percent,
        tp_hits,
        sl_hit,
    })
}

/// Worst unrealized excursion against the position on this candle, signed
/// percent of entry (negative = adverse).
fn excursion_percent(side: Side, entry: f64, candle: &Kline) -> f64 {
    match side {
        Side::Buy => (candle.low - entry) / entry * 100.0,
        Side::Sell => (entry - candle.high) / entry * 100.0,
    }
}

/// Fold a new candle's excursion into a running max-drawdown tracker (most
/// negative value seen so far).
pub fn fold_max_drawdown(running: f64, side: Side, entry: f64, candle: &Kline) -> f64 {
    running.min(excursion_percent(side, entry, candle))
}

/// Resolve a record that has outlived its `expires_at` without ever hitting
/// SL or a TP (spec §4.9 expiry scan).
pub fn resolve_expired(recommendation: &Recommendation, entry: f64, created_at: i64, last_close: f64, now: i64, running_max_drawdown_percent: f64) -> Resolution {
    let pnl_percent = match recommendation.action.side() {
        Some(Side::Buy) => (last_close - entry) / entry * 100.0,
        Some(Side::Sell) => (entry - last_close) / entry * 100.0,
        None => 0.0,
    };

    Resolution {
        outcome: Outcome::Expired,
        exit_reason: ExitReason::TimeExpired,
        exit_price: last_close,
        pnl_percent,
        duration_secs: now - created_at,
        max_drawdown_percent: running_max_drawdown_percent,
        tp_hits: vec![false; recommendation.take_profit.len()],
        sl_hit: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::AssetType;
    use crate::records::{Action, CorrelationAnalysis, FundamentalAnalysis, HistoricalAnalysis, MacroContext, PositionSizing, RiskLevel, SectorAnalysis};

    fn buy_recommendation(stop_loss: f64, take_profit: Vec<f64>) -> Recommendation {
        Recommendation {
            action: Action::Buy,
            confidence: 70,
            entry: Some(43_450.0),
            stop_loss: Some(stop_loss),
            take_profit,
            expected_holding_period: "4h".into(),
            risk_level: RiskLevel::Medium,
            asset_type: AssetType::Btc,
            reasoning: String::new(),
            key_points: vec![],
            conflicting_signals: vec![],
            warnings: vec![],
            market_sentiment: String::new(),
            technical_score: 60,
            fundamental_score: 60,
            position_sizing_recommendation: PositionSizing::default(),
            correlation_analysis: CorrelationAnalysis::default(),
            sector_analysis: SectorAnalysis::default(),
            fundamental_analysis: FundamentalAnalysis::default(),
            macro_context: MacroContext::default(),
            historical_analysis: HistoricalAnalysis::default(),
        }
    }

    fn candle(low: f64, high: f64) -> Kline {
        Kline::new(0, 60_000, (low + high) / 2.0, high, low, (low + high) / 2.0, 10.0, 1000.0, 5, 5.0, 500.0)
    }

    #[test]
    fn happy_buy_tp2_hit() {
        let rec = buy_recommendation(42_950.0, vec![44_100.0, 44_600.0, 45_200.0]);
        let c = candle(43_800.0, 44_650.0);
        let res = evaluate_candle(&rec, 43_450.0, 0, &c, 0.0).expect("should resolve");
        assert_eq!(res.outcome, Outcome::Win);
        assert_eq!(res.exit_reason, ExitReason::Tp2Hit);
        assert!((res.exit_price - 44_600.0).abs() < 1e-9);
        assert!((res.pnl_percent - 2.645).abs() < 0.01);
        assert_eq!(res.tp_hits, vec![true, true, false]);
        assert!(!res.sl_hit);
    }

    #[test]
    fn sl_wins_tie_break_when_both_trigger_same_bar() {
        let rec = buy_recommendation(42_950.0, vec![44_100.0, 44_600.0, 45_200.0]);
        let c = candle(42_900.0, 44_120.0);
        let res = evaluate_candle(&rec, 43_450.0, 0, &c, 0.0).expect("should resolve");
        assert_eq!(res.outcome, Outcome::Loss);
        assert_eq!(res.exit_reason, ExitReason::SlHit);
        assert!((res.exit_price - 42_950.0).abs() < 1e-9);
        assert!((res.pnl_percent + 1.151).abs() < 0.01);
        assert!(res.sl_hit);
        assert!(res.tp_hits.iter().all(|h| !h));
    }

    #[test]
    fn no_barrier_touched_returns_none() {
        let rec = buy_recommendation(42_950.0, vec![44_100.0]);
        let c = candle(43_400.0, 43_900.0);
        assert!(evaluate_candle(&rec, 43_450.0, 0, &c, 0.0).is_none());
    }

    #[test]
    fn expiry_resolution_uses_last_close_and_reports_time_expired() {
        let rec = buy_recommendation(43_350.0, vec![44_000.0]);
        let res = resolve_expired(&rec, 43_450.0, 0, 43_560.0, 604_800, 0.0);
        assert_eq!(res.outcome, Outcome::Expired);
        assert_eq!(res.exit_reason, ExitReason::TimeExpired);
        assert!(!res.sl_hit);
        assert!(res.tp_hits.iter().all(|h| !h));
    }

    #[test]
    fn sell_side_barriers_mirror_buy() {
        let mut rec = buy_recommendation(44_000.0, vec![42_000.0]);
        rec.action = Action::Sell;
        let c = candle(41_900.0, 43_000.0);
        let res = evaluate_candle(&rec, 43_450.0, 0, &c, 0.0).expect("should resolve");
        assert_eq!(res.outcome, Outcome::Win);
        assert_eq!(res.exit_reason, ExitReason::Tp1Hit);
    }

    #[test]
    fn max_drawdown_folds_to_most_negative_excursion() {
        let running = fold_max_drawdown(0.0, Side::Buy, 100.0, &candle(95.0, 101.0));
        assert!((running - (-5.0)).abs() < 1e-9);
        let running = fold_max_drawdown(running, Side::Buy, 100.0, &candle(98.0, 102.0));
        assert!((running - (-5.0)).abs() < 1e-9);
    }
}
