// =============================================================================
// Asset Classifier
// =============================================================================
//
// Maps a symbol and its rolling 24h quote volume onto an `AssetType`. The
// classification is deterministic and symbol-first: BTC and ETH are special
// cased by name, everything else falls through a descending quote-volume
// ladder. Each asset type carries the position-size and stop-width risk band
// the prompt assembler and recommendation validator use downstream.
// =============================================================================

use serde::{Deserialize, Serialize};

const LARGE_CAP_QUOTE_VOLUME_USD: f64 = 500_000_000.0;
const MID_CAP_QUOTE_VOLUME_USD: f64 = 50_000_000.0;
const SMALL_CAP_QUOTE_VOLUME_USD: f64 = 5_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Btc,
    Eth,
    LargeCapAlt,
    MidCapAlt,
    SmallCapAlt,
    MemeCoin,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::LargeCapAlt => "LARGE_CAP_ALT",
            Self::MidCapAlt => "MID_CAP_ALT",
            Self::SmallCapAlt => "SMALL_CAP_ALT",
            Self::MemeCoin => "MEME_COIN",
        };
        write!(f, "{s}")
    }
}

/// Position-size and stop-width guidance attached to an `AssetType`, echoed
/// into the prompt's risk block and used to sanity-check the model's stop
/// placement. Bands are the dynamic-risk cross-check table (spec §6.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBand {
    pub min_position_pct: f64,
    pub max_position_pct: f64,
    pub min_stop_pct: f64,
    pub max_stop_pct: f64,
    pub notes: &'static str,
}

impl AssetType {
    pub fn risk_band(&self) -> RiskBand {
        match self {
            Self::Btc => RiskBand { min_position_pct: 3.0, max_position_pct: 5.0, min_stop_pct: 4.0, max_stop_pct: 6.0, notes: "macro-sensitive, widen stops on news" },
            Self::Eth => RiskBand { min_position_pct: 2.0, max_position_pct: 3.0, min_stop_pct: 5.0, max_stop_pct: 8.0, notes: "sector + macro" },
            Self::LargeCapAlt => RiskBand { min_position_pct: 1.5, max_position_pct: 2.0, min_stop_pct: 8.0, max_stop_pct: 12.0, notes: "correlation-aware" },
            Self::MidCapAlt => RiskBand { min_position_pct: 1.0, max_position_pct: 1.5, min_stop_pct: 10.0, max_stop_pct: 15.0, notes: "rotation risk" },
            Self::SmallCapAlt => RiskBand { min_position_pct: 0.5, max_position_pct: 1.0, min_stop_pct: 15.0, max_stop_pct: 20.0, notes: "liquidity-aware" },
            Self::MemeCoin => RiskBand { min_position_pct: 0.05, max_position_pct: 0.1, min_stop_pct: 20.0, max_stop_pct: 30.0, notes: "auto-HIGH risk" },
        }
    }
}

/// Extract the base asset from a `{BASE}{QUOTE}` spot symbol, e.g.
/// `"ETHUSDT"` -> `"ETH"`. Falls back to the whole symbol when no known
/// quote suffix is found.
fn base_asset(symbol: &str) -> &str {
    const QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH"];
    for quote in QUOTES {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return base;
            }
        }
    }
    symbol
}

/// Classify `symbol` given its rolling 24h quote volume in USD terms.
///
/// Evaluated top-down, spec §4.3's six rules exactly: BTC, then ETH, then a
/// descending quote-volume ladder; anything below the small-cap floor falls
/// through to `MEME_COIN` rather than stopping at `SMALL_CAP_ALT`.
pub fn classify(symbol: &str, quote_volume_24h: f64) -> AssetType {
    let base = base_asset(symbol);

    if base.eq_ignore_ascii_case("BTC") {
        return AssetType::Btc;
    }
    if base.eq_ignore_ascii_case("ETH") {
        return AssetType::Eth;
    }

    if quote_volume_24h >= LARGE_CAP_QUOTE_VOLUME_USD {
        AssetType::LargeCapAlt
    } else if quote_volume_24h >= MID_CAP_QUOTE_VOLUME_USD {
        AssetType::MidCapAlt
    } else if quote_volume_24h >= SMALL_CAP_QUOTE_VOLUME_USD {
        AssetType::SmallCapAlt
    } else {
        AssetType::MemeCoin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_btc_regardless_of_volume() {
        assert_eq!(classify("BTCUSDT", 1.0), AssetType::Btc);
    }

    #[test]
    fn classifies_eth_regardless_of_volume() {
        assert_eq!(classify("ETHUSDT", 1.0), AssetType::Eth);
    }

    #[test]
    fn classifies_meme_coin_below_small_cap_floor() {
        assert_eq!(classify("PEPEUSDT", 2_000_000.0), AssetType::MemeCoin);
        assert_eq!(classify("DOGEUSDT", 0.0), AssetType::MemeCoin);
    }

    #[test]
    fn classifies_large_cap_alt_by_volume() {
        assert_eq!(classify("SOLUSDT", 600_000_000.0), AssetType::LargeCapAlt);
    }

    #[test]
    fn classifies_mid_cap_alt_by_volume() {
        assert_eq!(classify("INJUSDT", 80_000_000.0), AssetType::MidCapAlt);
    }

    #[test]
    fn classifies_small_cap_alt_between_floor_and_mid_threshold() {
        assert_eq!(classify("RANDOMUSDT", 6_000_000.0), AssetType::SmallCapAlt);
    }

    #[test]
    fn risk_band_tightens_down_the_cap_ladder() {
        assert!(AssetType::Btc.risk_band().max_position_pct > AssetType::MemeCoin.risk_band().max_position_pct);
        assert!(AssetType::Btc.risk_band().max_stop_pct < AssetType::MemeCoin.risk_band().max_stop_pct);
    }

    #[test]
    fn risk_band_matches_spec_table_for_btc_and_meme() {
        let btc = AssetType::Btc.risk_band();
        assert_eq!((btc.min_position_pct, btc.max_position_pct), (3.0, 5.0));
        assert_eq!((btc.min_stop_pct, btc.max_stop_pct), (4.0, 6.0));

        let meme = AssetType::MemeCoin.risk_band();
        assert_eq!((meme.min_position_pct, meme.max_position_pct), (0.05, 0.1));
        assert_eq!((meme.min_stop_pct, meme.max_stop_pct), (20.0, 30.0));
    }

    #[test]
    fn base_asset_strips_known_quote_suffix() {
        assert_eq!(base_asset("ETHUSDT"), "ETH");
        assert_eq!(base_asset("SOLBUSD"), "SOL");
    }
}
