// =============================================================================
// Exchange REST client — public market data only
// =============================================================================
//
// This client never touches a signed or private endpoint: no account
// balances, no order placement, no API-key signing. Every call here hits a
// public Binance REST endpoint.
// =============================================================================

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::market::Kline;

/// Public-market-data REST client.
#[derive(Clone)]
pub struct ExchangeClient {
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build reqwest client");

        let base_url = base_url.into();
        debug!(base_url = %base_url, "ExchangeClient initialised");

        Self { base_url, client }
    }

    /// GET /api/v3/klines (public) — closed candles only, trailing in-progress
    /// bar dropped by the caller before this result reaches a [`Kline`]
    /// consumer (exchanges always include the currently-forming bar last).
    ///
    /// Array indices in the raw response:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
    ///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
    #[instrument(skip(self), name = "exchange::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET /api/v3/klines returned {}: {}", status, body);
        }

        let raw = body.as_array().context("klines response is not an array")?;

        let mut klines = Vec::with_capacity(raw.len());

        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;

            if arr.len() < 11 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }

            let open_time = arr[0].as_i64().unwrap_or(0);
            let open = Self::parse_str_f64(&arr[1])?;
            let high = Self::parse_str_f64(&arr[2])?;
            let low = Self::parse_str_f64(&arr[3])?;
            let close = Self::parse_str_f64(&arr[4])?;
            let volume = Self::parse_str_f64(&arr[5])?;
            let close_time = arr[6].as_i64().unwrap_or(0);
            let quote_volume = Self::parse_str_f64(&arr[7])?;
            let trades_count = arr[8].as_u64().unwrap_or(0);
            let taker_buy_volume = Self::parse_str_f64(&arr[9])?;
            let taker_buy_quote_volume = Self::parse_str_f64(&arr[10])?;

            klines.push(Kline::new(
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
            ));
        }

        // The final element is always the in-progress bar; drop it so every
        // Kline handed to a caller is closed.
        klines.pop();

        debug!(symbol, interval, count = klines.len(), "klines fetched");
        Ok(klines)
    }

    /// GET /api/v3/ticker/24hr (public) — rolling 24h stats used for the
    /// market-data block in the prompt and by the asset classifier.
    #[instrument(skip(self), name = "exchange::get_24h_ticker")]
    pub async fn get_24h_ticker(&self, symbol: &str) -> Result<Ticker24h> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/ticker/24hr request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse ticker response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET /api/v3/ticker/24hr returned {}: {}", status, body);
        }

        Ok(Ticker24h {
            symbol: symbol.to_string(),
            price_change_pct: Self::parse_str_f64(&body["priceChangePercent"])?,
            last_price: Self::parse_str_f64(&body["lastPrice"])?,
            high_price: Self::parse_str_f64(&body["highPrice"])?,
            low_price: Self::parse_str_f64(&body["lowPrice"])?,
            volume: Self::parse_str_f64(&body["volume"])?,
            quote_volume: Self::parse_str_f64(&body["quoteVolume"])?,
        })
    }

    /// GET /api/v3/ticker/24hr (public, no `symbol` param) — every symbol's
    /// rolling 24h stats in one call. Used by the market-wide scanner to
    /// discover candidate pairs without a per-symbol request each.
    #[instrument(skip(self), name = "exchange::get_all_24h_tickers")]
    pub async fn get_all_24h_tickers(&self) -> Result<Vec<Ticker24h>> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/ticker/24hr (all) request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse all-tickers response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET /api/v3/ticker/24hr returned {}: {}", status, body);
        }

        let raw = body.as_array().context("all-tickers response is not an array")?;
        let mut tickers = Vec::with_capacity(raw.len());
        for entry in raw {
            let symbol = entry["symbol"].as_str().unwrap_or_default().to_string();
            let Ok(price_change_pct) = Self::parse_str_f64(&entry["priceChangePercent"]) else { continue };
            let Ok(last_price) = Self::parse_str_f64(&entry["lastPrice"]) else { continue };
            let Ok(high_price) = Self::parse_str_f64(&entry["highPrice"]) else { continue };
            let Ok(low_price) = Self::parse_str_f64(&entry["lowPrice"]) else { continue };
            let Ok(volume) = Self::parse_str_f64(&entry["volume"]) else { continue };
            let Ok(quote_volume) = Self::parse_str_f64(&entry["quoteVolume"]) else { continue };
            tickers.push(Ticker24h { symbol, price_change_pct, last_price, high_price, low_price, volume, quote_volume });
        }

        debug!(count = tickers.len(), "all 24h tickers fetched");
        Ok(tickers)
    }

    /// GET /api/v3/exchangeInfo filtered by symbol. Used by the asset
    /// classifier for tick-size/precision lookups.
    #[instrument(skip(self), name = "exchange::get_symbol_info")]
    pub async fn get_symbol_info(&self, symbol: &str) -> Result<serde_json::Value> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/exchangeInfo request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse exchangeInfo response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET /api/v3/exchangeInfo returned {}: {}", status, body);
        }

        let info = body["symbols"]
            .as_array()
            .and_then(|arr| arr.first().cloned())
            .context("symbol not found in exchangeInfo response")?;

        debug!(symbol, "symbol info retrieved");
        Ok(info)
    }

    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>().with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient").field("base_url", &self.base_url).finish()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub price_change_pct: f64,
    pub last_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: f64,
    pub quote_volume: f64,
}
