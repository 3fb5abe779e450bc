// =============================================================================
// Rate-Limit Tracker — pre-flight token bucket + reactive header accounting
// =============================================================================
//
// Two layers work together:
//   - `governor`'s `RateLimiter` enforces a hard token-bucket ceiling before
//     a request is ever sent, sized to 30% headroom under the exchange's
//     published per-minute request-weight limit.
//   - The header-reactive `used_weight_1m` counter mirrors what the exchange
//     itself reports after each response, purely for observability; it never
//     gates a request on its own.
// =============================================================================

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const WEIGHT_WARN_THRESHOLD: u32 = 800;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Thread-safe rate-limit tracker: a pre-flight token bucket plus a
/// header-reactive observability counter.
pub struct RateLimitTracker {
    bucket: Bucket,
    used_weight_1m: AtomicU32,
}

/// Immutable snapshot of the current rate-limit state (exposed over the
/// command API for operator diagnostics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
}

impl RateLimitTracker {
    /// `weight_per_min` should already include the desired headroom (the
    /// config default keeps 30% headroom under the exchange's published
    /// limit).
    pub fn new(weight_per_min: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(weight_per_min.max(1)).unwrap());
        Self {
            bucket: RateLimiter::direct(quota),
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Block until the bucket has capacity for one unit of request weight.
    pub async fn acquire(&self) {
        self.bucket.until_ready().await;
    }

    /// Non-blocking check: true if a request could be sent immediately.
    pub fn can_send_request(&self) -> bool {
        self.bucket.check().is_ok()
    }

    /// Update the observability counter from the HTTP response headers
    /// returned by the exchange. The most relevant header is
    /// `X-MBX-USED-WEIGHT-1M`.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(val) = headers.get("X-MBX-USED-WEIGHT-1M") {
            if let Ok(s) = val.to_str() {
                if let Ok(w) = s.parse::<u32>() {
                    let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
                    if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
                        warn!(used_weight = w, "rate-limit weight crossed warning threshold");
                    }
                    debug!(used_weight_1m = w, "rate-limit weight updated from header");
                }
            }
        }
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot { used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed) }
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .finish()
    }
}
