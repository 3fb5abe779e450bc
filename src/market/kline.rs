// =============================================================================
// Kline — a single closed candlestick
// =============================================================================
//
// The gateway never hands out in-progress candles: every `Kline` returned by
// a REST fetch or delivered over a subscription has already closed. This
// keeps every downstream indicator calculation free of the "is this bar
// still forming" question the teacher's `market_data::Candle` had to answer.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
}

impl Kline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        open_time: i64,
        close_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        quote_volume: f64,
        trades_count: u64,
        taker_buy_volume: f64,
        taker_buy_quote_volume: f64,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
            trades_count,
            taker_buy_volume,
            taker_buy_quote_volume,
        }
    }

    /// `(high + low + close + close) / 4`, the source series the spec
    /// requires for RSI and MFI instead of raw closes.
    pub fn hlcc4(&self) -> f64 {
        (self.high + self.low + self.close + self.close) / 4.0
    }

    /// `(open + high + low + close) / 4`, the source series the spec
    /// requires for the Stochastic oscillator.
    pub fn ohlc4(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }
}

/// A contiguous, gap-free run of closed klines for one `(symbol, timeframe)`.
///
/// The gateway only ever appends to the tail; callers needing a fixed-size
/// window read the trailing slice they need.
#[derive(Debug, Clone)]
pub struct KlineSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub klines: Vec<Kline>,
}

impl KlineSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, klines: Vec<Kline>) -> Self {
        Self { symbol: symbol.into(), timeframe, klines }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.klines.iter().map(|k| k.close).collect()
    }

    pub fn last(&self) -> Option<&Kline> {
        self.klines.last()
    }

    /// True if every kline's `open_time` is exactly `close_time` of the
    /// previous one plus one millisecond's worth of interval step — i.e. no
    /// missing bars. Gaps are detected by open_time monotonicity, not by a
    /// fixed step, since intervals vary by timeframe.
    pub fn is_contiguous(&self) -> bool {
        self.klines
            .windows(2)
            .all(|w| w[1].open_time > w[0].open_time && w[1].open_time <= w[0].close_time + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(open_time: i64, close_time: i64, o: f64, h: f64, l: f64, c: f64) -> Kline {
        Kline::new(open_time, close_time, o, h, l, c, 100.0, 100.0 * c, 10, 50.0, 50.0 * c)
    }

    #[test]
    fn hlcc4_matches_formula() {
        let kline = k(0, 59_999, 10.0, 12.0, 9.0, 11.0);
        assert!((kline.hlcc4() - (12.0 + 9.0 + 11.0 + 11.0) / 4.0).abs() < 1e-9);
    }

    #[test]
    fn ohlc4_matches_formula() {
        let kline = k(0, 59_999, 10.0, 12.0, 9.0, 11.0);
        assert!((kline.ohlc4() - (10.0 + 12.0 + 9.0 + 11.0) / 4.0).abs() < 1e-9);
    }

    #[test]
    fn contiguous_series_detects_no_gap() {
        let series = KlineSeries::new(
            "BTCUSDT",
            Timeframe::M1,
            vec![k(0, 59_999, 1.0, 1.0, 1.0, 1.0), k(60_000, 119_999, 1.0, 1.0, 1.0, 1.0)],
        );
        assert!(series.is_contiguous());
    }

    #[test]
    fn gap_in_series_is_detected() {
        let series = KlineSeries::new(
            "BTCUSDT",
            Timeframe::M1,
            vec![k(0, 59_999, 1.0, 1.0, 1.0, 1.0), k(180_000, 239_999, 1.0, 1.0, 1.0, 1.0)],
        );
        assert!(!series.is_contiguous());
    }
}
