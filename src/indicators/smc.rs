// =============================================================================
// Smart Money Concepts — swing structure and BOS/CHoCH
// =============================================================================
//
// Swing highs/lows are located with the same ±3-bar pivot test used for
// support/resistance. The running sequence of confirmed swings determines
// the market's structural bias:
//
//   - Break of Structure (BOS): price closes beyond the most recent swing
//     in the direction of the prevailing trend, confirming continuation.
//   - Change of Character (CHoCH): price closes beyond the most recent
//     swing against the prevailing trend, the first signal of a reversal.
//
// The bias starts `Neutral` until two swings establish a direction.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market::Kline;

const SWING_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureEvent {
    BreakOfStructure,
    ChangeOfCharacter,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmcStructure {
    pub bias: Bias,
    pub last_event: StructureEvent,
    pub last_swing_high: Option<f64>,
    pub last_swing_low: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Swing {
    High(f64),
    Low(f64),
}

fn is_pivot_high(klines: &[Kline], i: usize) -> bool {
    let lo = i.saturating_sub(SWING_WINDOW);
    let hi = (i + SWING_WINDOW + 1).min(klines.len());
    let pivot = klines[i].high;
    klines[lo..hi].iter().enumerate().all(|(j, c)| lo + j == i || c.high <= pivot)
}

fn is_pivot_low(klines: &[Kline], i: usize) -> bool {
    let lo = i.saturating_sub(SWING_WINDOW);
    let hi = (i + SWING_WINDOW + 1).min(klines.len());
    let pivot = klines[i].low;
    klines[lo..hi].iter().enumerate().all(|(j, c)| lo + j == i || c.low >= pivot)
}

/// Walk `klines` chronologically, tracking the swing sequence and emitting
/// the most recent structural bias/event pair. Requires at least
/// `2 * SWING_WINDOW + 1` candles to find a single pivot.
pub fn compute_structure(klines: &[Kline]) -> Option<SmcStructure> {
    if klines.len() < SWING_WINDOW * 2 + 1 {
        return None;
    }

    let mut swings: Vec<(usize, Swing)> = Vec::new();
    for i in SWING_WINDOW..klines.len() - SWING_WINDOW {
        if is_pivot_high(klines, i) {
            swings.push((i, Swing::High(klines[i].high)));
        } else if is_pivot_low(klines, i) {
            swings.push((i, Swing::Low(klines[i].low)));
        }
    }

    let mut bias = Bias::Neutral;
    let mut last_event = StructureEvent::None;
    let mut last_swing_high: Option<f64> = None;
    let mut last_swing_low: Option<f64> = None;

    for (pos, (idx, swing)) in swings.iter().enumerate() {
        match swing {
            Swing::High(price) => last_swing_high = Some(*price),
            Swing::Low(price) => last_swing_low = Some(*price),
        }

        // Once both sides of the structure exist, any later close beyond
        // the most recent opposite swing is a break. Evaluate only the
        // candles formed after this swing and before the next one — once a
        // later swing confirms, `last_swing_high`/`last_swing_low` move and
        // re-scanning this range under the old boundary would be wrong.
        let next_idx = swings.get(pos + 1).map(|(i, _)| *i).unwrap_or(klines.len());
        if let (Some(hi), Some(lo)) = (last_swing_high, last_swing_low) {
            for candle in &klines[idx + 1..next_idx] {
                if candle.close > hi {
                    last_event = match bias {
                        Bias::Bearish => StructureEvent::ChangeOfCharacter,
                        _ => StructureEvent::BreakOfStructure,
                    };
                    bias = Bias::Bullish;
                } else if candle.close < lo {
                    last_event = match bias {
                        Bias::Bullish => StructureEvent::ChangeOfCharacter,
                        _ => StructureEvent::BreakOfStructure,
                    };
                    bias = Bias::Bearish;
                }
            }
        }
    }

    Some(SmcStructure { bias, last_event, last_swing_high, last_swing_low })
}
