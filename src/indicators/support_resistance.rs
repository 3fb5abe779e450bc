// =============================================================================
// Support / Resistance — clustered pivot highs and lows
// =============================================================================
//
// A pivot high at index `i` is a candle whose high is the maximum within a
// `±window`-bar neighbourhood; a pivot low is the mirror image on lows.
// Pivots within `cluster_pct` of each other are merged into a single level
// (averaged), turning repeated touches of the same area into one zone
// instead of a cluttered list of near-duplicates.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market::Kline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub kind: Kind,
    pub touches: u32,
}

fn is_pivot_high(klines: &[Kline], i: usize, window: usize) -> bool {
    let lo = i.saturating_sub(window);
    let hi = (i + window + 1).min(klines.len());
    let pivot = klines[i].high;
    klines[lo..hi].iter().enumerate().all(|(j, c)| lo + j == i || c.high <= pivot)
}

fn is_pivot_low(klines: &[Kline], i: usize, window: usize) -> bool {
    let lo = i.saturating_sub(window);
    let hi = (i + window + 1).min(klines.len());
    let pivot = klines[i].low;
    klines[lo..hi].iter().enumerate().all(|(j, c)| lo + j == i || c.low >= pivot)
}

fn cluster(mut prices: Vec<f64>, cluster_pct: f64, kind: Kind) -> Vec<Level> {
    if prices.is_empty() {
        return Vec::new();
    }
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut levels: Vec<Level> = Vec::new();
    let mut bucket: Vec<f64> = vec![prices[0]];

    for &price in &prices[1..] {
        let anchor = bucket[0];
        if (price - anchor).abs() / anchor.abs().max(1.0) <= cluster_pct {
            bucket.push(price);
        } else {
            levels.push(Level {
                price: bucket.iter().sum::<f64>() / bucket.len() as f64,
                kind,
                touches: bucket.len() as u32,
            });
            bucket = vec![price];
        }
    }
    levels.push(Level {
        price: bucket.iter().sum::<f64>() / bucket.len() as f64,
        kind,
        touches: bucket.len() as u32,
    });

    levels
}

/// Find clustered support/resistance levels using a `±window`-bar pivot
/// definition and a `cluster_pct` merge tolerance (e.g. `0.0025` = 0.25%).
pub fn find_levels(klines: &[Kline], window: usize, cluster_pct: f64) -> Vec<Level> {
    if klines.len() < window * 2 + 1 {
        return Vec::new();
    }

    let mut highs = Vec::new();
    let mut lows = Vec::new();

    for i in window..klines.len() - window {
        if is_pivot_high(klines, i, window) {
            highs.push(klines[i].high);
        }
        if is_pivot_low(klines, i, window) {
            lows.push(klines[i].low);
        }
    }

    let mut levels = cluster(highs, cluster_pct, Kind::Resistance);
    levels.extend(cluster(lows, cluster_pct, Kind::Support));
    levels.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(h: f64, l: f64) -> Kline {
        let c = (h + l) / 2.0;
        Kline::new(0, 59_999, c, h, l, c, 10.0, 10.0 * c, 5, 5.0, 5.0 * c)
    }

    #[test]
    fn insufficient_data_returns_empty() {
        let klines = vec![k(101.0, 99.0); 3];
        assert!(find_levels(&klines, 3, 0.0025).is_empty());
    }

    #[test]
    fn detects_pivot_high_as_resistance() {
        let mut klines: Vec<Kline> = (0..7).map(|_| k(101.0, 99.0)).collect();
        klines[3] = k(110.0, 100.0);
        let levels = find_levels(&klines, 3, 0.0025);
        assert!(levels.iter().any(|l| l.kind == Kind::Resistance && (l.price - 110.0).abs() < 1e-9));
    }

    #[test]
    fn detects_pivot_low_as_support() {
        let mut klines: Vec<Kline> = (0..7).map(|_| k(101.0, 99.0)).collect();
        klines[3] = k(100.0, 90.0);
        let levels = find_levels(&klines, 3, 0.0025);
        assert!(levels.iter().any(|l| l.kind == Kind::Support && (l.price - 90.0).abs() < 1e-9));
    }

    #[test]
    fn nearby_pivots_are_clustered() {
        let levels = cluster(vec![100.0, 100.1, 100.05], 0.01, Kind::Resistance);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].touches, 3);
    }

    #[test]
    fn distant_pivots_stay_separate() {
        let levels = cluster(vec![100.0, 150.0], 0.0025, Kind::Support);
        assert_eq!(levels.len(), 2);
    }
}
