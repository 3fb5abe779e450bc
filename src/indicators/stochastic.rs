// =============================================================================
// Stochastic Oscillator (%K / %D) — OHLC/4 source
// =============================================================================
//
// Unlike the textbook stochastic (which compares the raw close against the
// high/low range), this engine sources everything from the OHLC/4 series to
// stay consistent with the rest of the indicator engine's smoothing.
//
// %K = 100 * (source - lowest_low(period)) / (highest_high(period) - lowest_low(period))
// %D = simple moving average of %K over `smoothing` periods.
// =============================================================================

use crate::market::Kline;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
}

/// Compute the most recent %K/%D pair.
///
/// `period` is the look-back window for the high/low range; `smoothing` is
/// the window over which %K is averaged into %D.
pub fn current_stochastic(klines: &[Kline], period: usize, smoothing: usize) -> Option<StochasticValue> {
    if period == 0 || smoothing == 0 || klines.len() < period + smoothing - 1 {
        return None;
    }

    let mut k_values = Vec::with_capacity(smoothing);

    for offset in 0..smoothing {
        let end = klines.len() - offset;
        let window = &klines[end - period..end];

        let highest_high = window.iter().map(|k| k.high).fold(f64::MIN, f64::max);
        let lowest_low = window.iter().map(|k| k.low).fold(f64::MAX, f64::min);
        let source = window.last()?.ohlc4();

        let range = highest_high - lowest_low;
        let k = if range == 0.0 { 50.0 } else { 100.0 * (source - lowest_low) / range };

        if !k.is_finite() {
            return None;
        }
        k_values.push(k);
    }

    let current_k = k_values[0];
    let d = k_values.iter().sum::<f64>() / k_values.len() as f64;

    Some(StochasticValue { k: current_k, d })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(o: f64, h: f64, l: f64, c: f64) -> Kline {
        Kline::new(0, 59_999, o, h, l, c, 100.0, 100.0 * c, 10, 50.0, 50.0 * c)
    }

    #[test]
    fn insufficient_data_returns_none() {
        let klines = vec![k(10.0, 11.0, 9.0, 10.0); 3];
        assert!(current_stochastic(&klines, 14, 3).is_none());
    }

    #[test]
    fn price_at_range_high_gives_k_near_100() {
        let mut klines: Vec<Kline> = (0..16).map(|_| k(50.0, 60.0, 40.0, 50.0)).collect();
        *klines.last_mut().unwrap() = k(59.0, 60.0, 40.0, 60.0);
        let result = current_stochastic(&klines, 14, 3).unwrap();
        assert!(result.k > 90.0, "expected %K near 100, got {}", result.k);
    }

    #[test]
    fn price_at_range_low_gives_k_near_0() {
        let mut klines: Vec<Kline> = (0..16).map(|_| k(50.0, 60.0, 40.0, 50.0)).collect();
        *klines.last_mut().unwrap() = k(41.0, 60.0, 40.0, 40.0);
        let result = current_stochastic(&klines, 14, 3).unwrap();
        assert!(result.k < 10.0, "expected %K near 0, got {}", result.k);
    }

    #[test]
    fn flat_range_yields_50() {
        let klines = vec![k(50.0, 50.0, 50.0, 50.0); 20];
        let result = current_stochastic(&klines, 14, 3).unwrap();
        assert!((result.k - 50.0).abs() < 1e-9);
        assert!((result.d - 50.0).abs() < 1e-9);
    }
}
