// =============================================================================
// Volume Profile — POC / VAH / VAL
// =============================================================================
//
// The window's price range is split into `bins` equal-width buckets; each
// candle's volume is attributed to the bucket containing its close. The
// Point of Control (POC) is the bucket holding the most volume; the Value
// Area (VAH/VAL) is the smallest contiguous run of buckets around the POC
// whose summed volume reaches `value_area_pct` of the total.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market::Kline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpPosition {
    Discount,
    Neutral,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub position: VpPosition,
}

/// Compute the volume profile for `klines` using `bins` equal-width price
/// buckets. Returns `None` when the window is empty or every candle's high
/// equals its low across the whole window (zero usable range AND zero
/// volume), which would make POC undefined.
pub fn compute_volume_profile(
    klines: &[Kline],
    bins: usize,
    value_area_pct: f64,
) -> Option<VolumeProfile> {
    if klines.is_empty() || bins == 0 {
        return None;
    }

    let low = klines.iter().map(|k| k.low).fold(f64::MAX, f64::min);
    let high = klines.iter().map(|k| k.high).fold(f64::MIN, f64::max);

    let current_close = klines.last()?.close;

    // Flat series (high == low everywhere): all volume sits at one price.
    if (high - low).abs() < f64::EPSILON {
        return Some(VolumeProfile {
            poc: current_close,
            vah: current_close,
            val: current_close,
            position: VpPosition::Neutral,
        });
    }

    let bin_width = (high - low) / bins as f64;
    let mut bucket_volume = vec![0.0_f64; bins];

    for k in klines {
        let mut idx = ((k.close - low) / bin_width) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        bucket_volume[idx] += k.volume;
    }

    let total_volume: f64 = bucket_volume.iter().sum();
    if total_volume <= 0.0 {
        return Some(VolumeProfile {
            poc: current_close,
            vah: current_close,
            val: current_close,
            position: VpPosition::Neutral,
        });
    }

    let bin_mid = |i: usize| low + bin_width * (i as f64 + 0.5);

    let (poc_idx, _) = bucket_volume
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap();

    // Expand outward from the POC bucket, each step adding whichever
    // neighbour holds more volume, until the value area holds
    // `value_area_pct` of total volume.
    let mut lo = poc_idx;
    let mut hi = poc_idx;
    let mut acc = bucket_volume[poc_idx];
    let target = total_volume * value_area_pct;

    while acc < target && (lo > 0 || hi < bins - 1) {
        let left_vol = if lo > 0 { bucket_volume[lo - 1] } else { -1.0 };
        let right_vol = if hi < bins - 1 { bucket_volume[hi + 1] } else { -1.0 };

        if right_vol >= left_vol {
            hi += 1;
            acc += bucket_volume[hi];
        } else {
            lo -= 1;
            acc += bucket_volume[lo];
        }
    }

    let poc = bin_mid(poc_idx);
    let val = low + bin_width * lo as f64;
    let vah = low + bin_width * (hi as f64 + 1.0);

    let position = if current_close < val {
        VpPosition::Discount
    } else if current_close > vah {
        VpPosition::Premium
    } else {
        VpPosition::Neutral
    };

    Some(VolumeProfile { poc, vah, val, position })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(close: f64, volume: f64) -> Kline {
        Kline::new(0, 59_999, close, close + 1.0, close - 1.0, close, volume, volume * close, 10, volume / 2.0, volume * close / 2.0)
    }

    #[test]
    fn flat_series_yields_single_level() {
        let klines: Vec<Kline> = (0..200).map(|_| k(100.0, 50.0)).collect();
        let vp = compute_volume_profile(&klines, 24, 0.70).unwrap();
        assert!((vp.poc - 100.0).abs() < 1.0);
        assert!((vp.vah - vp.poc).abs() < 1.0);
        assert!((vp.val - vp.poc).abs() < 1.0);
        assert_eq!(vp.position, VpPosition::Neutral);
    }

    #[test]
    fn empty_series_returns_none() {
        assert!(compute_volume_profile(&[], 24, 0.70).is_none());
    }

    #[test]
    fn discount_position_below_value_area() {
        // Heavy volume clustered near the top of the range; a low close
        // should land below VAL -> DISCOUNT.
        let mut klines: Vec<Kline> = (0..50).map(|_| k(190.0, 1000.0)).collect();
        klines.push(k(100.0, 1.0));
        let vp = compute_volume_profile(&klines, 24, 0.70).unwrap();
        assert_eq!(vp.position, VpPosition::Discount);
    }

    #[test]
    fn premium_position_above_value_area() {
        let mut klines: Vec<Kline> = (0..50).map(|_| k(110.0, 1000.0)).collect();
        klines.push(k(200.0, 1.0));
        let vp = compute_volume_profile(&klines, 24, 0.70).unwrap();
        assert_eq!(vp.position, VpPosition::Premium);
    }

    #[test]
    fn value_area_contains_poc() {
        let klines: Vec<Kline> = (0..200)
            .map(|i| k(100.0 + (i % 20) as f64, 10.0 + (i % 7) as f64))
            .collect();
        let vp = compute_volume_profile(&klines, 24, 0.70).unwrap();
        assert!(vp.val <= vp.poc && vp.poc <= vp.vah);
    }
}
