// =============================================================================
// Order Blocks — last opposite candle before a displacement move
// =============================================================================
//
// A bullish order block is the last bearish candle immediately preceding a
// displacement move whose range exceeds `atr_multiplier * ATR(atr_period)`;
// a bearish order block is the mirror image (last bullish candle before a
// down-displacement). Each block is tracked for how many later candles have
// traded back into its range without invalidating it ("tests") — a candle
// whose wick enters the zone but whose close passes through the zone's far
// side doesn't count, since that close breaks the block rather than testing
// it. All detected blocks are returned with their test-count; it's the
// caller's call whether a heavily-tested block is still relevant.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::atr::calculate_atr;
use crate::market::Kline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub low: f64,
    pub high: f64,
    pub direction: Direction,
    pub tests: u32,
}

/// Detect order blocks in `klines`, each with its test-count. Requires at
/// least `atr_period + 2` candles (one for the candidate block, one for the
/// displacement move, plus the ATR warm-up window).
pub fn detect_order_blocks(klines: &[Kline], atr_period: usize, atr_multiplier: f64) -> Vec<OrderBlock> {
    if klines.len() < atr_period + 2 {
        return Vec::new();
    }

    let mut blocks: Vec<(OrderBlock, usize)> = Vec::new();

    for i in 1..klines.len() {
        let window = &klines[..=i];
        let atr = match calculate_atr(window, atr_period) {
            Some(v) if v > 0.0 => v,
            _ => continue,
        };

        let displacement = &klines[i];
        let candidate = &klines[i - 1];
        let move_range = (displacement.close - displacement.open).abs();

        if move_range < atr_multiplier * atr {
            continue;
        }

        let is_up_move = displacement.close > displacement.open;
        let candidate_is_bearish = candidate.close < candidate.open;
        let candidate_is_bullish = candidate.close > candidate.open;

        if is_up_move && candidate_is_bearish {
            blocks.push((
                OrderBlock {
                    low: candidate.low,
                    high: candidate.high,
                    direction: Direction::Bullish,
                    tests: 0,
                },
                i - 1,
            ));
        } else if !is_up_move && candidate_is_bullish {
            blocks.push((
                OrderBlock {
                    low: candidate.low,
                    high: candidate.high,
                    direction: Direction::Bearish,
                    tests: 0,
                },
                i - 1,
            ));
        }
    }

    blocks
        .into_iter()
        .map(|(mut block, formed_at)| {
            block.tests = klines[formed_at + 1..]
                .iter()
                .filter(|c| wick_tests_without_closing_through(c, &block))
                .count() as u32;
            block
        })
        .collect()
}

/// A candle "tests" a block when its wick trades into `[block.low,
/// block.high]` but its close stays on the side that keeps the block
/// intact. A close through the far side invalidates the block instead of
/// testing it, so it's excluded from the count.
fn wick_tests_without_closing_through(c: &Kline, block: &OrderBlock) -> bool {
    let wick_overlaps = c.low <= block.high && c.high >= block.low;
    if !wick_overlaps {
        return false;
    }
    match block.direction {
        Direction::Bullish => c.close >= block.low,
        Direction::Bearish => c.close <= block.high,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(o: f64, h: f64, l: f64, c: f64) -> Kline {
        Kline::new(0, 59_999, o, h, l, c, 100.0, 100.0 * c, 10, 50.0, 50.0 * c)
    }

    fn quiet_series(n: usize, price: f64) -> Vec<Kline> {
        (0..n).map(|_| k(price, price + 0.5, price - 0.5, price)).collect()
    }

    #[test]
    fn insufficient_data_returns_empty() {
        let klines = quiet_series(5, 100.0);
        assert!(detect_order_blocks(&klines, 14, 1.5).is_empty());
    }

    #[test]
    fn detects_bullish_order_block_before_up_displacement() {
        let mut klines = quiet_series(16, 100.0);
        // Last-bearish candle right before a strong up displacement.
        klines.push(k(100.0, 100.5, 98.0, 98.5));
        klines.push(k(98.5, 115.0, 98.5, 114.0));
        let blocks = detect_order_blocks(&klines, 14, 1.5);
        assert!(blocks.iter().any(|b| b.direction == Direction::Bullish));
    }

    #[test]
    fn detects_bearish_order_block_before_down_displacement() {
        let mut klines = quiet_series(16, 100.0);
        klines.push(k(100.0, 102.0, 99.5, 101.5));
        klines.push(k(101.5, 101.5, 85.0, 86.0));
        let blocks = detect_order_blocks(&klines, 14, 1.5);
        assert!(blocks.iter().any(|b| b.direction == Direction::Bearish));
    }

    #[test]
    fn heavily_tested_block_is_still_returned_with_its_count() {
        let mut klines = quiet_series(16, 100.0);
        klines.push(k(100.0, 100.5, 98.0, 98.5));
        klines.push(k(98.5, 115.0, 98.5, 114.0));
        // Retrace back into the block range repeatedly, closing each time
        // above the block's low so none of these tests invalidate it.
        for _ in 0..4 {
            klines.push(k(99.0, 99.5, 98.2, 99.0));
        }
        let blocks = detect_order_blocks(&klines, 14, 1.5);
        let block = blocks.iter().find(|b| b.direction == Direction::Bullish).expect("bullish block present");
        assert_eq!(block.tests, 4);
    }

    #[test]
    fn close_through_the_zone_does_not_count_as_a_test() {
        let mut klines = quiet_series(16, 100.0);
        klines.push(k(100.0, 100.5, 98.0, 98.5));
        klines.push(k(98.5, 115.0, 98.5, 114.0));
        // Wick enters the bullish block's [98.0, 98.5] zone but closes below
        // its low, breaking the block rather than testing it.
        klines.push(k(99.0, 99.2, 97.5, 97.8));
        let blocks = detect_order_blocks(&klines, 14, 1.5);
        let block = blocks.iter().find(|b| b.direction == Direction::Bullish).expect("bullish block present");
        assert_eq!(block.tests, 0);
    }
}
