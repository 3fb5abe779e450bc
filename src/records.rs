// =============================================================================
// Domain record types — Recommendation, AnalysisRecord, Resolution, LearningSummary
// =============================================================================
//
// These are the fully-typed, always-populated records the rest of the engine
// passes around. The LLM client's recovery parser is the only place that
// tolerates partial input; everything downstream of it sees one of these
// types fully constructed, with typed defaults standing in for anything the
// model omitted.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::classifier::AssetType;
use crate::indicators::bundle::MultiTimeframeBundle;
use crate::types::{Side, Timeframe, TradingStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Wait,
}

impl Action {
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::Buy => Some(Side::Buy),
            Self::Sell => Some(Side::Sell),
            Self::Hold | Self::Wait => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::Wait => "WAIT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Free-form structured sub-object the LLM fills in; every field defaults to
/// an empty/zero value when the model omits the whole object (spec §3.5,
/// §4.7 default injection).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    pub recommended_pct: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    pub correlated_assets: Vec<String>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorAnalysis {
    pub sector: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalAnalysis {
    pub summary: String,
    pub score_rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroContext {
    pub dominance_pct: Option<f64>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAnalysis {
    pub week_over_week_price_change_pct: Option<f64>,
    pub week_over_week_volume_change_pct: Option<f64>,
    pub notes: String,
}

/// Structured LLM output (spec §3.5). Always fully populated — the LLM
/// client's parsing pipeline never hands a partial value further down the
/// stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub confidence: u8,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Vec<f64>,
    pub expected_holding_period: String,
    pub risk_level: RiskLevel,
    pub asset_type: AssetType,
    pub reasoning: String,
    pub key_points: Vec<String>,
    pub conflicting_signals: Vec<String>,
    pub warnings: Vec<String>,
    pub market_sentiment: String,
    pub technical_score: u8,
    pub fundamental_score: u8,
    pub position_sizing_recommendation: PositionSizing,
    pub correlation_analysis: CorrelationAnalysis,
    pub sector_analysis: SectorAnalysis,
    pub fundamental_analysis: FundamentalAnalysis,
    pub macro_context: MacroContext,
    pub historical_analysis: HistoricalAnalysis,
}

impl Recommendation {
    /// A BUY/SELL recommendation with a stop-loss and at least one
    /// take-profit is eligible for tracking (spec §3.4 inv. (b)).
    pub fn is_trackable(&self) -> bool {
        matches!(self.action, Action::Buy | Action::Sell) && self.stop_loss.is_some() && !self.take_profit.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Tp1Hit,
    Tp2Hit,
    Tp3Hit,
    Tp4Hit,
    Tp5Hit,
    SlHit,
    TimeExpired,
}

impl ExitReason {
    /// The take-profit exit reason for 1-indexed hit `k` (1..=5).
    pub fn take_profit(k: usize) -> Self {
        match k {
            1 => Self::Tp1Hit,
            2 => Self::Tp2Hit,
            3 => Self::Tp3Hit,
            4 => Self::Tp4Hit,
            _ => Self::Tp5Hit,
        }
    }
}

/// Written by the tracker once a record resolves (spec §3.6). Immutable
/// once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: Outcome,
    pub exit_reason: ExitReason,
    pub exit_price: f64,
    pub pnl_percent: f64,
    pub duration_secs: i64,
    pub max_drawdown_percent: f64,
    pub tp_hits: Vec<bool>,
    pub sl_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    PendingTracking,
    Resolved,
    Expired,
}

/// The central entity (spec §3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub user_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub trading_style: TradingStyle,
    pub created_at: i64,
    pub expires_at: i64,
    pub market_snapshot: MultiTimeframeBundle,
    pub recommendation: Recommendation,
    pub resolution: Option<Resolution>,
    pub state: LifecycleState,
}

const SEVEN_DAYS_SECS: i64 = 7 * 24 * 60 * 60;

impl AnalysisRecord {
    /// Build a new record id of the form `{symbol}_{created_at}_{user-id suffix}`
    /// (spec §4.8 step 7).
    pub fn build_id(symbol: &str, created_at: i64, user_id: i64) -> String {
        let suffix = (user_id.unsigned_abs() % 10_000).to_string();
        format!("{symbol}_{created_at}_{suffix}")
    }

    pub fn expires_at_for(created_at: i64) -> i64 {
        created_at + SEVEN_DAYS_SECS
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: i64,
        symbol: String,
        timeframe: Timeframe,
        trading_style: TradingStyle,
        created_at: i64,
        market_snapshot: MultiTimeframeBundle,
        recommendation: Recommendation,
    ) -> Self {
        let id = Self::build_id(&symbol, created_at, user_id);
        let expires_at = Self::expires_at_for(created_at);
        let state = if recommendation.is_trackable() {
            LifecycleState::PendingTracking
        } else {
            LifecycleState::Resolved
        };

        Self {
            id,
            user_id,
            symbol,
            timeframe,
            trading_style,
            created_at,
            expires_at,
            market_snapshot,
            recommendation,
            resolution: None,
            state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpPositionMode {
    Discount,
    Neutral,
    Premium,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub rsi_mean: f64,
    pub rsi_p10: f64,
    pub rsi_p90: f64,
    pub mfi_mean: f64,
    pub mfi_p10: f64,
    pub mfi_p90: f64,
    pub dominant_vp_position: VpPositionMode,
}

/// Derived on demand for a `(user_id, symbol, window)` (spec §3.7, §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSummary {
    pub total_count: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub win_rate: f64,
    pub avg_win_pnl: f64,
    pub avg_loss_pnl: f64,
    pub winning_pattern: Option<PatternSummary>,
    pub losing_pattern: Option<PatternSummary>,
    pub similarity: String,
}

impl LearningSummary {
    pub fn no_data() -> Self {
        Self {
            total_count: 0,
            win_count: 0,
            loss_count: 0,
            win_rate: 0.0,
            avg_win_pnl: 0.0,
            avg_loss_pnl: 0.0,
            winning_pattern: None,
            losing_pattern: None,
            similarity: "NO DATA".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_recommendation(action: Action, stop_loss: Option<f64>, take_profit: Vec<f64>) -> Recommendation {
        Recommendation {
            action,
            confidence: 50,
            entry: Some(100.0),
            stop_loss,
            take_profit,
            expected_holding_period: "4h".to_string(),
            risk_level: RiskLevel::Medium,
            asset_type: AssetType::Btc,
            reasoning: String::new(),
            key_points: Vec::new(),
            conflicting_signals: Vec::new(),
            warnings: Vec::new(),
            market_sentiment: String::new(),
            technical_score: 50,
            fundamental_score: 50,
            position_sizing_recommendation: PositionSizing::default(),
            correlation_analysis: CorrelationAnalysis::default(),
            sector_analysis: SectorAnalysis::default(),
            fundamental_analysis: FundamentalAnalysis::default(),
            macro_context: MacroContext::default(),
            historical_analysis: HistoricalAnalysis::default(),
        }
    }

    #[test]
    fn buy_with_sl_and_tp_is_trackable() {
        let rec = dummy_recommendation(Action::Buy, Some(95.0), vec![105.0]);
        assert!(rec.is_trackable());
    }

    #[test]
    fn hold_is_never_trackable() {
        let rec = dummy_recommendation(Action::Hold, Some(95.0), vec![105.0]);
        assert!(!rec.is_trackable());
    }

    #[test]
    fn buy_without_stop_loss_is_not_trackable() {
        let rec = dummy_recommendation(Action::Buy, None, vec![105.0]);
        assert!(!rec.is_trackable());
    }

    #[test]
    fn expires_at_is_exactly_seven_days_after_created_at() {
        let created_at = 1_700_000_000;
        assert_eq!(AnalysisRecord::expires_at_for(created_at) - created_at, SEVEN_DAYS_SECS);
    }

    #[test]
    fn build_id_embeds_symbol_and_timestamp() {
        let id = AnalysisRecord::build_id("BTCUSDT", 1_700_000_000, 111);
        assert!(id.starts_with("BTCUSDT_1700000000_"));
    }

    #[test]
    fn trackable_recommendation_creates_pending_record() {
        let rec = dummy_recommendation(Action::Buy, Some(95.0), vec![105.0]);
        let bundle = MultiTimeframeBundle {
            snapshots: std::collections::HashMap::new(),
            overall_consensus: crate::indicators::bundle::Consensus::Neutral,
            strength: 0,
        };
        let record = AnalysisRecord::new(111, "BTCUSDT".to_string(), Timeframe::H1, TradingStyle::Swing, 0, bundle, rec);
        assert_eq!(record.state, LifecycleState::PendingTracking);
    }

    #[test]
    fn no_data_summary_reports_no_data_string() {
        assert_eq!(LearningSummary::no_data().similarity, "NO DATA");
    }
}
