// =============================================================================
// LLM Client with Recovery Parser (spec §4.7)
// =============================================================================
//
// Posts the assembled prompt to an OpenAI-compatible chat-completions
// endpoint and recovers a `Recommendation` from whatever text comes back,
// trying three strategies in order: strict JSON, a brace-balanced substring,
// then a field-regex fallback that fills in typed defaults for everything
// it can't find. Parsing never fails outright — validation failures
// downgrade the action to WAIT and attach a warning instead of raising.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{instrument, warn};

use crate::classifier::AssetType;
use crate::error::LLMError;
use crate::records::{
    Action, CorrelationAnalysis, FundamentalAnalysis, HistoricalAnalysis, MacroContext, PositionSizing, Recommendation, RiskLevel,
    SectorAnalysis,
};

const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 1_000;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Submission-policy gate: one outstanding request per user, a per-process
/// concurrency cap, and a minimum inter-request spacing (spec §4.7).
pub struct LLMClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f64,
    concurrency: Arc<Semaphore>,
    min_interval: Duration,
    last_request_at: Arc<Mutex<Option<tokio::time::Instant>>>,
    in_flight_users: Arc<dashmap::DashSet<i64>>,
}

impl LLMClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, temperature: f64, timeout_secs: u64, max_concurrent: usize, min_interval_ms: u64) -> Self {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs)).build().expect("failed to build reqwest client");

        Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            temperature,
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_interval: Duration::from_millis(min_interval_ms),
            last_request_at: Arc::new(Mutex::new(None)),
            in_flight_users: Arc::new(dashmap::DashSet::new()),
        }
    }

    async fn respect_spacing(&self) {
        let mut guard = self.last_request_at.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(tokio::time::Instant::now());
    }

    /// Submit `prompt` on behalf of `user_id` and recover a `Recommendation`
    /// from the response, applying defaults, then post-parse validation
    /// against `expected_asset_type`.
    #[instrument(skip(self, prompt), fields(user_id))]
    pub async fn analyze(&self, user_id: i64, prompt: &str, expected_asset_type: AssetType) -> Result<Recommendation, LLMError> {
        if !self.in_flight_users.insert(user_id) {
            return Err(LLMError::Unrecoverable);
        }
        let _guard = scopeguard(self.in_flight_users.clone(), user_id);

        let _permit = self.concurrency.acquire().await.map_err(|_| LLMError::Unrecoverable)?;
        self.respect_spacing().await;

        let raw = self.post_with_retry(prompt).await?;
        let mut recommendation = recover_recommendation(&raw, expected_asset_type);
        validate(&mut recommendation, expected_asset_type);
        Ok(recommendation)
    }

    async fn post_with_retry(&self, prompt: &str) -> Result<String, LLMError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: "You are a disciplined crypto trading analyst. Respond with strict JSON only.".to_string() },
                ChatMessage { role: "user", content: prompt.to_string() },
            ],
            temperature: self.temperature,
            max_tokens: 1024,
        };

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.http.post(&self.endpoint).json(&body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        last_err = Some(LLMError::BadStatus(status.as_u16()));
                    } else {
                        match resp.json::<ChatResponse>().await {
                            Ok(parsed) => {
                                if let Some(choice) = parsed.choices.into_iter().next() {
                                    return Ok(choice.message.content);
                                }
                                last_err = Some(LLMError::Unrecoverable);
                            }
                            Err(err) => last_err = Some(LLMError::Request(err)),
                        }
                    }
                }
                Err(err) => last_err = Some(LLMError::Request(err)),
            }

            if attempt + 1 < MAX_RETRIES {
                let delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(last_err.unwrap_or(LLMError::Unrecoverable))
    }
}

/// RAII drop-guard releasing the per-user in-flight marker.
struct InFlightGuard {
    set: Arc<dashmap::DashSet<i64>>,
    user_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.user_id);
    }
}

fn scopeguard(set: Arc<dashmap::DashSet<i64>>, user_id: i64) -> InFlightGuard {
    InFlightGuard { set, user_id }
}

// =============================================================================
// Recovery parser
// =============================================================================

fn default_recommendation(asset_type: AssetType) -> Recommendation {
    Recommendation {
        action: Action::Wait,
        confidence: 0,
        entry: None,
        stop_loss: None,
        take_profit: Vec::new(),
        expected_holding_period: String::new(),
        risk_level: RiskLevel::Medium,
        asset_type,
        reasoning: String::new(),
        key_points: Vec::new(),
        conflicting_signals: Vec::new(),
        warnings: Vec::new(),
        market_sentiment: String::new(),
        technical_score: 0,
        fundamental_score: 0,
        position_sizing_recommendation: PositionSizing::default(),
        correlation_analysis: CorrelationAnalysis::default(),
        sector_analysis: SectorAnalysis::default(),
        fundamental_analysis: FundamentalAnalysis::default(),
        macro_context: MacroContext::default(),
        historical_analysis: HistoricalAnalysis::default(),
    }
}

fn brace_balanced_substring(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

static ACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""?action"?\s*[:=]\s*"?(BUY|SELL|HOLD|WAIT)"?"#).unwrap());
static CONFIDENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""?confidence"?\s*[:=]\s*"?(\d+(?:\.\d+)?)"#).unwrap());
static ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""?entry_point"?\s*[:=]\s*"?(-?\d+(?:\.\d+)?)"#).unwrap());
static STOP_LOSS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""?stop_loss"?\s*[:=]\s*"?(-?\d+(?:\.\d+)?)"#).unwrap());
static TAKE_PROFIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(-?\d+(?:\.\d+)?)"#).unwrap());
static TAKE_PROFIT_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""?take_profit"?\s*[:=]\s*\[([^\]]*)\]"#).unwrap());
static REASONING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""?reasoning_vietnamese"?\s*[:=]\s*"([^"]*)""#).unwrap());

fn regex_fallback(text: &str, asset_type: AssetType) -> Recommendation {
    let mut rec = default_recommendation(asset_type);

    if let Some(caps) = ACTION_RE.captures(text) {
        rec.action = match &caps[1] {
            "BUY" => Action::Buy,
            "SELL" => Action::Sell,
            "HOLD" => Action::Hold,
            _ => Action::Wait,
        };
    }
    if let Some(caps) = CONFIDENCE_RE.captures(text) {
        rec.confidence = caps[1].parse::<f64>().unwrap_or(0.0).clamp(0.0, 100.0) as u8;
    }
    if let Some(caps) = ENTRY_RE.captures(text) {
        rec.entry = caps[1].parse::<f64>().ok();
    }
    if let Some(caps) = STOP_LOSS_RE.captures(text) {
        rec.stop_loss = caps[1].parse::<f64>().ok();
    }
    if let Some(caps) = TAKE_PROFIT_ARRAY_RE.captures(text) {
        rec.take_profit = TAKE_PROFIT_RE.find_iter(&caps[1]).filter_map(|m| m.as_str().parse::<f64>().ok()).collect();
    }
    if let Some(caps) = REASONING_RE.captures(text) {
        rec.reasoning = caps[1].to_string();
    }

    rec.warnings.push("LLM_PARSE_PARTIAL".to_string());
    rec
}

fn value_to_recommendation(value: &Value, asset_type: AssetType) -> Recommendation {
    let mut rec = default_recommendation(asset_type);

    if let Some(action) = value.get("action").and_then(Value::as_str) {
        rec.action = match action.to_ascii_uppercase().as_str() {
            "BUY" => Action::Buy,
            "SELL" => Action::Sell,
            "HOLD" => Action::Hold,
            _ => Action::Wait,
        };
    }
    if let Some(c) = value.get("confidence").and_then(Value::as_f64) {
        rec.confidence = c.clamp(0.0, 100.0) as u8;
    }
    rec.entry = value.get("entry_point").and_then(Value::as_f64);
    rec.stop_loss = value.get("stop_loss").and_then(Value::as_f64);
    if let Some(arr) = value.get("take_profit").and_then(Value::as_array) {
        rec.take_profit = arr.iter().filter_map(Value::as_f64).collect();
    }
    if let Some(s) = value.get("expected_holding_period").and_then(Value::as_str) {
        rec.expected_holding_period = s.to_string();
    }
    if let Some(s) = value.get("risk_level").and_then(Value::as_str) {
        rec.risk_level = match s.to_ascii_uppercase().as_str() {
            "LOW" => RiskLevel::Low,
            "HIGH" => RiskLevel::High,
            _ => RiskLevel::Medium,
        };
    }
    if let Some(s) = value.get("reasoning_vietnamese").and_then(Value::as_str) {
        rec.reasoning = s.to_string();
    }
    if let Some(arr) = value.get("key_points").and_then(Value::as_array) {
        rec.key_points = arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    }
    if let Some(arr) = value.get("conflicting_signals").and_then(Value::as_array) {
        rec.conflicting_signals = arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    }
    if let Some(arr) = value.get("warnings").and_then(Value::as_array) {
        rec.warnings = arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    }
    if let Some(s) = value.get("market_sentiment").and_then(Value::as_str) {
        rec.market_sentiment = s.to_string();
    }
    if let Some(n) = value.get("technical_score").and_then(Value::as_f64) {
        rec.technical_score = n.clamp(0.0, 100.0) as u8;
    }
    if let Some(n) = value.get("fundamental_score").and_then(Value::as_f64) {
        rec.fundamental_score = n.clamp(0.0, 100.0) as u8;
    }

    rec
}

/// Try strict JSON, then a brace-balanced substring, then a field-regex
/// fallback, in that order, until one succeeds (spec §4.7).
fn recover_recommendation(text: &str, asset_type: AssetType) -> Recommendation {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value_to_recommendation(&value, asset_type);
    }

    if let Some(substring) = brace_balanced_substring(text) {
        if let Ok(value) = serde_json::from_str::<Value>(substring) {
            return value_to_recommendation(&value, asset_type);
        }
    }

    warn!("falling back to field-regex recovery for LLM response");
    regex_fallback(text, asset_type)
}

/// Post-parse validation (spec §4.7): downgrades to WAIT with a warning
/// instead of raising.
fn validate(rec: &mut Recommendation, expected_asset_type: AssetType) {
    let mut downgrade = false;

    match rec.action {
        Action::Buy => {
            if let (Some(entry), Some(sl)) = (rec.entry, rec.stop_loss) {
                if sl >= entry {
                    downgrade = true;
                }
            } else {
                downgrade = true;
            }
            if rec.take_profit.is_empty() || !rec.take_profit.windows(2).all(|w| w[0] < w[1]) {
                downgrade = true;
            }
        }
        Action::Sell => {
            if let (Some(entry), Some(sl)) = (rec.entry, rec.stop_loss) {
                if sl <= entry {
                    downgrade = true;
                }
            } else {
                downgrade = true;
            }
            if rec.take_profit.is_empty() || !rec.take_profit.windows(2).all(|w| w[0] > w[1]) {
                downgrade = true;
            }
        }
        Action::Hold | Action::Wait => {}
    }

    if rec.confidence > 100 {
        downgrade = true;
    }
    if rec.asset_type != expected_asset_type {
        rec.warnings.push(format!("asset type mismatch: echoed {} expected {}", rec.asset_type, expected_asset_type));
        rec.asset_type = expected_asset_type;
    }

    if downgrade {
        rec.action = Action::Wait;
        rec.confidence = rec.confidence.min(40);
        rec.warnings.push("VALIDATION_DOWNGRADED_TO_WAIT".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses_directly() {
        let text = r#"{"action":"BUY","confidence":80,"entry_point":100.0,"stop_loss":95.0,"take_profit":[105.0,110.0]}"#;
        let rec = recover_recommendation(text, AssetType::Btc);
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 80);
        assert_eq!(rec.take_profit, vec![105.0, 110.0]);
    }

    #[test]
    fn brace_balanced_substring_recovers_from_surrounding_prose() {
        let text = format!("Here is my analysis: {{\"action\":\"SELL\",\"confidence\":60}} hope that helps!");
        let rec = recover_recommendation(&text, AssetType::Eth);
        assert_eq!(rec.action, Action::Sell);
        assert_eq!(rec.confidence, 60);
    }

    #[test]
    fn regex_fallback_extracts_partial_fields_and_flags_warning() {
        let text = r#"action: BUY, confidence: 82, entry_point: 100, stop_loss: 95, take_profit: [truncated"#;
        let rec = recover_recommendation(text, AssetType::Btc);
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 82);
        assert!(rec.warnings.contains(&"LLM_PARSE_PARTIAL".to_string()));
    }

    #[test]
    fn validation_downgrades_non_monotonic_take_profit_to_wait() {
        let mut rec = default_recommendation(AssetType::Btc);
        rec.action = Action::Buy;
        rec.entry = Some(100.0);
        rec.stop_loss = Some(95.0);
        rec.take_profit = vec![110.0, 105.0];
        validate(&mut rec, AssetType::Btc);
        assert_eq!(rec.action, Action::Wait);
        assert!(rec.warnings.iter().any(|w| w.contains("DOWNGRADED")));
    }

    #[test]
    fn validation_downgrades_stop_loss_on_wrong_side() {
        let mut rec = default_recommendation(AssetType::Btc);
        rec.action = Action::Buy;
        rec.entry = Some(100.0);
        rec.stop_loss = Some(105.0);
        rec.take_profit = vec![110.0];
        validate(&mut rec, AssetType::Btc);
        assert_eq!(rec.action, Action::Wait);
    }

    #[test]
    fn validation_downgrades_buy_with_empty_take_profit() {
        // spec §8.4 scenario 4: recovery extracts action=BUY, confidence=82
        // but fails to parse take_profit. Expected: WAIT, confidence=40.
        let mut rec = default_recommendation(AssetType::Btc);
        rec.action = Action::Buy;
        rec.confidence = 82;
        rec.entry = Some(100.0);
        rec.stop_loss = Some(95.0);
        rec.take_profit = Vec::new();
        validate(&mut rec, AssetType::Btc);
        assert_eq!(rec.action, Action::Wait);
        assert_eq!(rec.confidence, 40);
    }

    #[test]
    fn validation_downgrades_buy_missing_entry_or_stop_loss() {
        let mut rec = default_recommendation(AssetType::Btc);
        rec.action = Action::Buy;
        rec.entry = None;
        rec.stop_loss = Some(95.0);
        rec.take_profit = vec![105.0, 110.0];
        validate(&mut rec, AssetType::Btc);
        assert_eq!(rec.action, Action::Wait);
    }

    #[test]
    fn validation_rewrites_mismatched_asset_type() {
        let mut rec = default_recommendation(AssetType::Eth);
        rec.action = Action::Hold;
        validate(&mut rec, AssetType::Btc);
        assert_eq!(rec.asset_type, AssetType::Btc);
        assert!(rec.warnings.iter().any(|w| w.contains("asset type mismatch")));
    }

    #[test]
    fn brace_balanced_substring_handles_nested_braces() {
        let text = r#"noise {"a": {"b": 1}} trailing"#;
        let substring = brace_balanced_substring(text).unwrap();
        assert_eq!(substring, r#"{"a": {"b": 1}}"#);
    }
}
