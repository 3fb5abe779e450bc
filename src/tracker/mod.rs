// =============================================================================
// Price Tracker Module (spec §4.9)
// =============================================================================
//
// Resolves PENDING_TRACKING records deterministically against closed
// 1-minute candles: the barrier logic lives in `triple_barrier`, the
// subscription/active-set lifecycle in `monitor`.

pub mod monitor;
pub mod triple_barrier;
