// =============================================================================
// WebSocket kline streams — closed-candle-only subscriptions
// =============================================================================
//
// Each `(symbol, interval)` gets its own combined-stream connection. The
// exchange sends a kline update on every tick; only updates where `"x":true`
// (the bar has closed) are ever forwarded to the caller. The caller never
// sees a partially-formed bar.
//
// Reconnection uses capped exponential backoff (1s, 2s, 4s, 8s, 16s, then
// holds at 16s) so a flaky network doesn't spin the task.
// =============================================================================

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::gateway::client::ExchangeClient;
use crate::market::Kline;

const MAX_BACKOFF_SECS: u64 = 16;
/// REST backfill window on reconnect: generous enough to cover the capped
/// backoff (up to 16s between attempts) plus however long the drop itself
/// lasted, for every timeframe this stream can be opened on.
const BACKFILL_LIMIT: u32 = 50;

fn parse_string_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64())
}

/// Parse a single combined-stream or single-stream kline WebSocket message.
/// Returns `Some((interval, kline))` only when the bar in the message has
/// closed (`"x": true`); in-progress ticks return `None`.
pub fn parse_kline_message(raw: &str) -> Option<(String, Kline)> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;

    // Combined-stream envelope: {"stream": "...", "data": {...}}
    let payload = value.get("data").unwrap_or(&value);
    let k = payload.get("k")?;

    let is_closed = k.get("x")?.as_bool()?;
    if !is_closed {
        return None;
    }

    let interval = k.get("i")?.as_str()?.to_string();
    let open_time = k.get("t")?.as_i64()?;
    let close_time = k.get("T")?.as_i64()?;
    let open = parse_string_f64(k.get("o")?)?;
    let high = parse_string_f64(k.get("h")?)?;
    let low = parse_string_f64(k.get("l")?)?;
    let close = parse_string_f64(k.get("c")?)?;
    let volume = parse_string_f64(k.get("v")?)?;
    let quote_volume = parse_string_f64(k.get("q")?)?;
    let trades_count = k.get("n")?.as_u64()?;
    let taker_buy_volume = parse_string_f64(k.get("V")?)?;
    let taker_buy_quote_volume = parse_string_f64(k.get("Q")?)?;

    let kline = Kline::new(
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
    );

    Some((interval, kline))
}

fn build_kline_stream_url(ws_base: &str, symbol: &str, interval: &str) -> String {
    format!("{}/ws/{}@kline_{}", ws_base, symbol.to_lowercase(), interval)
}

/// Fetch the candles the stream may have missed while disconnected and
/// forward every one still newer than `last_close_time`. Best-effort: a
/// failed backfill is logged and the stream resumes live regardless, since
/// the next closed candle still arrives over the websocket either way.
async fn backfill_gap(client: &ExchangeClient, symbol: &str, interval: &str, last_close_time: Option<i64>, tx: &mpsc::Sender<Kline>) -> Option<i64> {
    let klines = match client.get_klines(symbol, interval, BACKFILL_LIMIT).await {
        Ok(k) => k,
        Err(e) => {
            warn!(symbol, interval, error = %e, "reconnect gap backfill failed, resuming live only");
            return last_close_time;
        }
    };

    let mut newest_close_time = last_close_time;
    for kline in klines {
        if last_close_time.is_some_and(|t| kline.close_time <= t) {
            continue;
        }
        newest_close_time = Some(newest_close_time.map_or(kline.close_time, |t| t.max(kline.close_time)));
        debug!(symbol, interval, close = kline.close, "gap candle backfilled after reconnect");
        if tx.send(kline).await.is_err() {
            break;
        }
    }
    newest_close_time
}

/// Run a single `(symbol, interval)` kline subscription until `shutdown` is
/// signalled, reconnecting with capped exponential backoff on any drop. On
/// every reconnect (not the initial connect), the gap since the last closed
/// candle is backfilled via REST before the live read loop resumes, so a
/// drop never silently skips a resolution. Every closed candle — backfilled
/// or live — is sent down `tx`; the receiver end is dropped when the caller
/// wants to cancel this subscription.
pub async fn run_kline_stream(
    client: ExchangeClient,
    ws_base: String,
    symbol: String,
    interval: String,
    tx: mpsc::Sender<Kline>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut backoff_secs = 1u64;
    let mut last_close_time: Option<i64> = None;
    let mut reconnecting = false;

    loop {
        let url = build_kline_stream_url(&ws_base, &symbol, &interval);

        let connect = tokio_tungstenite::connect_async(&url);

        tokio::select! {
            _ = shutdown.recv() => {
                info!(symbol = %symbol, interval = %interval, "kline stream cancelled before connect");
                return;
            }
            result = connect => {
                match result {
                    Ok((ws_stream, _)) => {
                        backoff_secs = 1;
                        info!(symbol = %symbol, interval = %interval, "kline stream connected");

                        if reconnecting {
                            last_close_time = backfill_gap(&client, &symbol, &interval, last_close_time, &tx).await;
                        }
                        reconnecting = true;

                        let (_, mut read) = ws_stream.split();

                        loop {
                            tokio::select! {
                                _ = shutdown.recv() => {
                                    info!(symbol = %symbol, interval = %interval, "kline stream cancelled");
                                    return;
                                }
                                msg = read.next() => {
                                    match msg {
                                        Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                                            if let Some((_, kline)) = parse_kline_message(&text) {
                                                debug!(symbol = %symbol, interval = %interval, close = kline.close, "closed candle received");
                                                last_close_time = Some(kline.close_time);
                                                if tx.send(kline).await.is_err() {
                                                    info!(symbol = %symbol, interval = %interval, "receiver dropped, stopping stream");
                                                    return;
                                                }
                                            }
                                        }
                                        Some(Ok(_)) => {}
                                        Some(Err(e)) => {
                                            warn!(symbol = %symbol, interval = %interval, error = %e, "kline stream read error, reconnecting");
                                            break;
                                        }
                                        None => {
                                            warn!(symbol = %symbol, interval = %interval, "kline stream ended, reconnecting");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, interval = %interval, error = %e, "kline stream connect failed");
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_contains_stream_name() {
        let url = build_kline_stream_url("wss://stream.binance.com:9443", "BTCUSDT", "5m");
        assert!(url.contains("btcusdt@kline_5m"));
    }

    #[test]
    fn in_progress_candle_is_filtered_out() {
        let raw = r#"{"e":"kline","k":{"t":1,"T":2,"s":"BTCUSDT","i":"1m","o":"1","h":"2","l":"0.5","c":"1.5","v":"10","q":"15","n":5,"V":"5","Q":"7.5","x":false}}"#;
        assert!(parse_kline_message(raw).is_none());
    }

    #[test]
    fn closed_candle_parses_ok() {
        let raw = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","k":{"t":1,"T":59999,"s":"BTCUSDT","i":"1m","o":"1","h":"2","l":"0.5","c":"1.5","v":"10","q":"15","n":5,"V":"5","Q":"7.5","x":true}}}"#;
        let (interval, kline) = parse_kline_message(raw).expect("should parse");
        assert_eq!(interval, "1m");
        assert!((kline.close - 1.5).abs() < 1e-9);
        assert_eq!(kline.trades_count, 5);
    }

    #[test]
    fn malformed_json_returns_none() {
        assert!(parse_kline_message("not json").is_none());
    }
}
