// =============================================================================
// Scheduled Scanners (spec §4.10)
// =============================================================================
//
// Two independent periodic sweeps that call the orchestrator on the
// scanners' own behalf rather than a real end user's: `market_wide` screens
// every quote-USD pair for daily-timeframe extremes, `bot_activity` screens
// for abnormal recent volume/RSI movement. Both are bounded by a shared
// `scanner_concurrency` semaphore and go through the same gateway every
// other collaborator uses, so they're subject to the same rate limiter.
// =============================================================================

pub mod bot_activity;
pub mod market_wide;

/// Reserved pseudo-user id scanner-triggered analyses are recorded under.
/// Scanners act on behalf of the service itself, not a real end user;
/// real user ids are assigned by the collaborator that owns account
/// management and are never expected to collide with this value.
pub const SCANNER_USER_ID: i64 = 0;
