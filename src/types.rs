// =============================================================================
// Shared types used across the Aurora signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// A kline interval accepted by the gateway and indicator engine.
///
/// The canonical multi-timeframe bundle is `{M1, M5, H1, H4, D1}`; `M1` is
/// only used by the price tracker (never by the indicator engine) and
/// optionally by the Stochastic+RSI indicator per the spec's resolved
/// ambiguity (see SPEC_FULL.md §D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Binance interval string, e.g. "1m", "4h".
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            "1d" => Some(Self::D1),
            _ => None,
        }
    }

    /// The canonical 4-timeframe consensus set (spec §4.2): the coarsest
    /// timeframes voted over for overall consensus.
    pub const CONSENSUS_SET: [Timeframe; 4] = [Self::M5, Self::H1, Self::H4, Self::D1];

    /// The full bundle requested once per analysis (spec §4.2).
    pub const BUNDLE_SET: [Timeframe; 5] = [Self::M1, Self::M5, Self::H1, Self::H4, Self::D1];
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trading style selected by the caller; influences nothing in the engine
/// directly but is echoed into the prompt and persisted record (spec §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingStyle {
    Scalping,
    Swing,
}

impl std::fmt::Display for TradingStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalping => write!(f, "scalping"),
            Self::Swing => write!(f, "swing"),
        }
    }
}

/// Trade direction implied by a recommendation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_roundtrips_through_str() {
        for tf in Timeframe::BUNDLE_SET {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
    }

    #[test]
    fn unknown_timeframe_parses_to_none() {
        assert_eq!(Timeframe::parse("3m"), None);
    }

    #[test]
    fn consensus_set_excludes_m1() {
        assert!(!Timeframe::CONSENSUS_SET.contains(&Timeframe::M1));
        assert_eq!(Timeframe::CONSENSUS_SET.len(), 4);
    }
}
