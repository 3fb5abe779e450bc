// =============================================================================
// Fair Value Gaps (FVG) — three-candle imbalance zones
// =============================================================================
//
// A bullish FVG forms when candle `i`'s low sits above candle `i-2`'s high,
// leaving the middle candle's range unfilled by either neighbour: the zone
// is `[high[i-2], low[i]]`. A bearish FVG is the mirror image. A zone is
// "filled" the first time a later candle's [low, high] range overlaps it;
// only unfilled zones are returned, nearest to the current price first.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market::Kline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub low: f64,
    pub high: f64,
    pub direction: Direction,
    /// Heuristic in [0, 1]: closer gaps to the current price are more
    /// likely to be revisited soon than distant ones.
    pub fill_probability: f64,
}

impl FairValueGap {
    fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    fn overlaps(&self, candle_low: f64, candle_high: f64) -> bool {
        candle_low <= self.high && candle_high >= self.low
    }
}

/// Detect every three-candle FVG pattern in `klines`, drop zones a later
/// candle has since filled, and sort what remains by distance to the last
/// close (nearest first).
pub fn detect_fair_value_gaps(klines: &[Kline]) -> Vec<FairValueGap> {
    if klines.len() < 3 {
        return Vec::new();
    }

    let current_price = klines.last().unwrap().close;
    let price_scale = current_price.abs().max(1.0);

    let mut zones: Vec<(FairValueGap, usize)> = Vec::new();

    for i in 2..klines.len() {
        let left = &klines[i - 2];
        let right = &klines[i];

        if right.low > left.high {
            zones.push((
                FairValueGap {
                    low: left.high,
                    high: right.low,
                    direction: Direction::Bullish,
                    fill_probability: 0.0,
                },
                i,
            ));
        } else if left.low > right.high {
            zones.push((
                FairValueGap {
                    low: right.high,
                    high: left.low,
                    direction: Direction::Bearish,
                    fill_probability: 0.0,
                },
                i,
            ));
        }
    }

    let mut unfilled: Vec<FairValueGap> = zones
        .into_iter()
        .filter(|(zone, formed_at)| {
            !klines[formed_at + 1..]
                .iter()
                .any(|c| zone.overlaps(c.low, c.high))
        })
        .map(|(mut zone, _)| {
            let distance = (current_price - zone.mid()).abs() / price_scale;
            zone.fill_probability = (1.0 - distance.min(1.0)).clamp(0.05, 0.95);
            zone
        })
        .collect();

    unfilled.sort_by(|a, b| {
        let da = (current_price - a.mid()).abs();
        let db = (current_price - b.mid()).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });

    unfilled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(low: f64, high: f64) -> Kline {
        let close = (low + high) / 2.0;
        Kline::new(0, 59_999, close, high, low, close, 10.0, 10.0 * close, 5, 5.0, 5.0 * close)
    }

    #[test]
    fn detects_bullish_gap() {
        let klines = vec![k(95.0, 100.0), k(100.0, 105.0), k(106.0, 110.0)];
        let gaps = detect_fair_value_gaps(&klines);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, Direction::Bullish);
        assert!((gaps[0].low - 100.0).abs() < 1e-9);
        assert!((gaps[0].high - 106.0).abs() < 1e-9);
    }

    #[test]
    fn detects_bearish_gap() {
        let klines = vec![k(105.0, 110.0), k(100.0, 104.0), k(90.0, 95.0)];
        let gaps = detect_fair_value_gaps(&klines);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, Direction::Bearish);
    }

    #[test]
    fn filled_gap_is_excluded() {
        let klines = vec![
            k(95.0, 100.0),
            k(100.0, 105.0),
            k(106.0, 110.0),
            // This candle's range overlaps the [100, 106] gap -> filled.
            k(99.0, 107.0),
        ];
        assert!(detect_fair_value_gaps(&klines).is_empty());
    }

    #[test]
    fn fewer_than_three_candles_yields_none() {
        let klines = vec![k(95.0, 100.0), k(100.0, 105.0)];
        assert!(detect_fair_value_gaps(&klines).is_empty());
    }

    #[test]
    fn no_gap_when_candles_overlap() {
        let klines = vec![k(95.0, 102.0), k(100.0, 105.0), k(101.0, 108.0)];
        assert!(detect_fair_value_gaps(&klines).is_empty());
    }
}
