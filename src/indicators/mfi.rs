// =============================================================================
// Money Flow Index (MFI) — volume-weighted RSI
// =============================================================================
//
// MFI uses the HLCC/4 typical price (same source series RSI uses here) paired
// with volume to measure buying/selling pressure.
//
// Step 1 — Typical price per bar: `(H + L + C + C) / 4`.
// Step 2 — Raw money flow: `typical_price * volume`.
// Step 3 — Classify each bar's money flow as positive or negative by
//          comparing its typical price to the previous bar's.
// Step 4 — Money ratio = sum(positive flow) / sum(negative flow) over the
//          look-back window.
// Step 5 — MFI = 100 - 100 / (1 + money_ratio).
//
// Thresholds: MFI >= 80 => OVERBOUGHT, MFI <= 20 => OVERSOLD.
// =============================================================================

use crate::market::Kline;

/// Compute the most recent MFI value over a trailing `period`-bar window.
///
/// Returns `None` when there are fewer than `period + 1` klines (one extra
/// bar is needed to classify the first bar in the window as up/down).
pub fn current_mfi(klines: &[Kline], period: usize) -> Option<f64> {
    if period == 0 || klines.len() < period + 1 {
        return None;
    }

    let window = &klines[klines.len() - period - 1..];

    let mut positive_flow = 0.0_f64;
    let mut negative_flow = 0.0_f64;

    for pair in window.windows(2) {
        let prev_tp = pair[0].hlcc4();
        let tp = pair[1].hlcc4();
        let raw_flow = tp * pair[1].volume;

        if tp > prev_tp {
            positive_flow += raw_flow;
        } else if tp < prev_tp {
            negative_flow += raw_flow;
        }
        // Equal typical prices contribute to neither side.
    }

    let mfi = if negative_flow == 0.0 && positive_flow == 0.0 {
        50.0
    } else if negative_flow == 0.0 {
        100.0
    } else {
        let money_ratio = positive_flow / negative_flow;
        100.0 - 100.0 / (1.0 + money_ratio)
    };

    if mfi.is_finite() {
        Some(mfi)
    } else {
        None
    }
}

/// `current_mfi` paired with an OVERBOUGHT/OVERSOLD/NEUTRAL label.
pub fn current_mfi_labeled(klines: &[Kline], period: usize) -> Option<(f64, &'static str)> {
    let value = current_mfi(klines, period)?;
    let label = if value >= 80.0 {
        "OVERBOUGHT"
    } else if value <= 20.0 {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    };
    Some((value, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(h: f64, l: f64, c: f64, v: f64) -> Kline {
        Kline::new(0, 59_999, c, h, l, c, v, v * c, 10, v / 2.0, v * c / 2.0)
    }

    #[test]
    fn insufficient_data_returns_none() {
        let klines = vec![k(10.0, 9.0, 9.5, 100.0); 5];
        assert!(current_mfi(&klines, 14).is_none());
    }

    #[test]
    fn all_rising_typical_price_yields_100() {
        let klines: Vec<Kline> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                k(base + 1.0, base - 1.0, base, 50.0)
            })
            .collect();
        let mfi = current_mfi(&klines, 14).unwrap();
        assert!((mfi - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_falling_typical_price_yields_0() {
        let klines: Vec<Kline> = (0..20)
            .map(|i| {
                let base = 200.0 - i as f64;
                k(base + 1.0, base - 1.0, base, 50.0)
            })
            .collect();
        let mfi = current_mfi(&klines, 14).unwrap();
        assert!(mfi.abs() < 1e-9);
    }

    #[test]
    fn flat_typical_price_yields_50() {
        let klines = vec![k(101.0, 99.0, 100.0, 50.0); 20];
        let mfi = current_mfi(&klines, 14).unwrap();
        assert!((mfi - 50.0).abs() < 1e-9);
    }

    #[test]
    fn labeled_overbought_and_oversold() {
        let rising: Vec<Kline> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                k(base + 1.0, base - 1.0, base, 50.0)
            })
            .collect();
        let (_, label) = current_mfi_labeled(&rising, 14).unwrap();
        assert_eq!(label, "OVERBOUGHT");

        let falling: Vec<Kline> = (0..20)
            .map(|i| {
                let base = 200.0 - i as f64;
                k(base + 1.0, base - 1.0, base, 50.0)
            })
            .collect();
        let (_, label) = current_mfi_labeled(&falling, 14).unwrap();
        assert_eq!(label, "OVERSOLD");
    }
}
