// =============================================================================
// Gateway facade — caching, rate limiting and retries layered over the
// bare exchange client (spec §4.1)
// =============================================================================
//
// `Gateway` is the single handle every collaborator (orchestrator, tracker,
// scanners) holds. It owns the one process-wide rate limiter and the kline
// caches, and multiplexes closed-candle subscriptions so many callers
// interested in the same `(symbol, timeframe)` share one websocket.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::error::DataError;
use crate::gateway::cache::TtlCache;
use crate::gateway::client::{ExchangeClient, Ticker24h};
use crate::gateway::rate_limit::RateLimitTracker;
use crate::gateway::streams::run_kline_stream;
use crate::market::Kline;
use crate::types::Timeframe;

const MAX_RETRIES: u32 = 3;
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// A live multiplexed subscription to one `(symbol, timeframe)` closed-candle
/// stream. Dropping every clone of the returned receiver does not tear the
/// stream down by itself; callers that know they are the last interested
/// party call [`Gateway::unsubscribe_closed_candles`] explicitly (the tracker
/// does this once no active record references the symbol any more).
struct Subscription {
    tx: broadcast::Sender<Kline>,
    shutdown: broadcast::Sender<()>,
}

/// Caching, rate-limited wrapper around [`ExchangeClient`] plus multiplexed
/// websocket subscriptions. Cheap to clone: everything inside is `Arc`'d.
#[derive(Clone)]
pub struct Gateway {
    client: ExchangeClient,
    ws_base: String,
    rate_limiter: Arc<RateLimitTracker>,
    klines_short: Arc<TtlCache<(String, Timeframe), Vec<Kline>>>,
    klines_medium: Arc<TtlCache<(String, Timeframe), Vec<Kline>>>,
    klines_long: Arc<TtlCache<(String, Timeframe), Vec<Kline>>>,
    ticker_cache: Arc<TtlCache<String, Ticker24h>>,
    subscriptions: Arc<DashMap<(String, Timeframe), Subscription>>,
}

impl Gateway {
    pub fn new(rest_base_url: impl Into<String>, ws_base: impl Into<String>, timeout_secs: u64, weight_per_min: u32) -> Self {
        Self {
            client: ExchangeClient::new(rest_base_url, timeout_secs),
            ws_base: ws_base.into(),
            rate_limiter: Arc::new(RateLimitTracker::new(weight_per_min)),
            klines_short: Arc::new(TtlCache::new(Duration::from_secs(60))),
            klines_medium: Arc::new(TtlCache::new(Duration::from_secs(5 * 60))),
            klines_long: Arc::new(TtlCache::new(Duration::from_secs(60 * 60))),
            ticker_cache: Arc::new(TtlCache::new(Duration::from_secs(60))),
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    fn kline_cache(&self, timeframe: Timeframe) -> &TtlCache<(String, Timeframe), Vec<Kline>> {
        match timeframe {
            Timeframe::M1 | Timeframe::M5 => &self.klines_short,
            Timeframe::M15 | Timeframe::H1 | Timeframe::H4 => &self.klines_medium,
            Timeframe::D1 => &self.klines_long,
        }
    }

    /// Returns the last `limit` closed candles. Cache hits skip rate-limit
    /// accounting entirely; misses acquire a token before the retry loop.
    pub async fn get_klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Kline>, DataError> {
        let key = (symbol.to_string(), timeframe);
        if let Some(cached) = self.kline_cache(timeframe).get(&key) {
            return Ok(cached);
        }

        let klines = self.with_retry(|| self.client.get_klines(symbol, timeframe.as_str(), limit)).await?;
        self.kline_cache(timeframe).insert(key, klines.clone());
        Ok(klines)
    }

    pub async fn get_24h_ticker(&self, symbol: &str) -> Result<Ticker24h, DataError> {
        if let Some(cached) = self.ticker_cache.get(&symbol.to_string()) {
            return Ok(cached);
        }

        let ticker = self.with_retry(|| self.client.get_24h_ticker(symbol)).await?;
        self.ticker_cache.insert(symbol.to_string(), ticker.clone());
        Ok(ticker)
    }

    /// Transient and RateLimited failures are retried up to `MAX_RETRIES`
    /// times with exponential backoff; UnavailableRegion/UnknownSymbol are
    /// not retried and surface immediately.
    async fn with_retry<T, F, Fut>(&self, f: F) -> Result<T, DataError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        self.rate_limiter.acquire().await;
        let mut attempt = 0u32;
        let mut backoff_ms = 250u64;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let classified = classify_error(&e);
                    let retryable = matches!(classified, DataError::RateLimited { .. }) || is_transient(&e);
                    if !retryable || attempt >= MAX_RETRIES {
                        return Err(classified);
                    }
                    attempt += 1;
                    warn!(attempt, error = %e, "gateway call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    self.rate_limiter.acquire().await;
                }
            }
        }
    }

    /// Every symbol's 24h ticker in one request, for the market-wide
    /// scanner's symbol discovery sweep. Not cached: the scanner itself
    /// only calls this every `market_scan_interval_secs`.
    pub async fn get_all_24h_tickers(&self) -> Result<Vec<Ticker24h>, DataError> {
        self.with_retry(|| self.client.get_all_24h_tickers()).await
    }

    /// Subscribe to closed candles for `(symbol, timeframe)`. Subscriptions
    /// are de-duplicated: the first caller spawns the underlying websocket
    /// task, later callers for the same key share its broadcast channel.
    pub fn subscribe_closed_candles(&self, symbol: &str, timeframe: Timeframe) -> broadcast::Receiver<Kline> {
        let key = (symbol.to_string(), timeframe);
        if let Some(sub) = self.subscriptions.get(&key) {
            return sub.tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (forward_tx, mut forward_rx) = mpsc::channel::<Kline>(SUBSCRIBER_CHANNEL_CAPACITY);

        tokio::spawn(run_kline_stream(self.client.clone(), self.ws_base.clone(), symbol.to_string(), timeframe.as_str().to_string(), forward_tx, shutdown_rx));

        let broadcast_tx = tx.clone();
        let sym = symbol.to_string();
        tokio::spawn(async move {
            while let Some(kline) = forward_rx.recv().await {
                if broadcast_tx.send(kline).is_err() {
                    break;
                }
            }
            info!(symbol = %sym, "kline forwarder exiting");
        });

        self.subscriptions.insert(key, Subscription { tx: tx.clone(), shutdown: shutdown_tx });
        rx
    }

    /// Tear down the websocket task for `(symbol, timeframe)`. Safe to call
    /// even if no subscription exists.
    pub fn unsubscribe_closed_candles(&self, symbol: &str, timeframe: Timeframe) {
        if let Some((_, sub)) = self.subscriptions.remove(&(symbol.to_string(), timeframe)) {
            let _ = sub.shutdown.send(());
        }
    }

    pub fn rate_limit_snapshot(&self) -> crate::gateway::rate_limit::RateLimitSnapshot {
        self.rate_limiter.snapshot()
    }
}

/// Classify an opaque transport error into a [`DataError`] kind. The
/// `ExchangeClient` methods return `anyhow::Error` built from `reqwest`
/// failures and `anyhow::bail!` messages; this inspects the message text
/// for the markers those call sites leave behind.
fn classify_error(err: &anyhow::Error) -> DataError {
    let msg = err.to_string();
    if msg.contains("-1121") || msg.contains("Invalid symbol") {
        return DataError::UnknownSymbol(msg);
    }
    if msg.contains("429") || msg.contains("418") {
        return DataError::RateLimited { retry_after_ms: 1000 };
    }
    DataError::MalformedResponse(msg)
}

fn is_transient(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("request failed") || msg.contains("timed out") || msg.contains("error sending request")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_unknown_symbol() {
        let err = anyhow::anyhow!("exchange GET /api/v3/klines returned 400 Bad Request: {\"code\":-1121,\"msg\":\"Invalid symbol.\"}");
        assert!(matches!(classify_error(&err), DataError::UnknownSymbol(_)));
    }

    #[test]
    fn classify_rate_limited() {
        let err = anyhow::anyhow!("exchange GET /api/v3/klines returned 429 Too Many Requests: {}");
        assert!(matches!(classify_error(&err), DataError::RateLimited { .. }));
    }

    #[test]
    fn cache_tier_picks_short_for_minute_timeframes() {
        let gw = Gateway::new("https://api.binance.com", "wss://stream.binance.com:9443", 10, 1000);
        assert!(std::ptr::eq(gw.kline_cache(Timeframe::M1), &*gw.klines_short));
        assert!(std::ptr::eq(gw.kline_cache(Timeframe::D1), &*gw.klines_long));
    }
}
