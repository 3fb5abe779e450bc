// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Aurora signal engine. Every tunable
// parameter lives here so that the engine can be reconfigured without a
// rebuild.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_binance_rest_base() -> String {
    "https://api.binance.com".to_string()
}

fn default_binance_ws_base() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_llm_endpoint() -> String {
    String::new()
}

fn default_llm_model() -> String {
    "default".to_string()
}

fn default_llm_temperature() -> f64 {
    0.3
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_llm_max_concurrent() -> usize {
    4
}

fn default_llm_min_interval_ms() -> u64 {
    1_000
}

fn default_rest_timeout_secs() -> u64 {
    10
}

fn default_db_timeout_secs() -> u64 {
    5
}

fn default_db_path() -> String {
    "aurora_signal_engine.db".to_string()
}

fn default_db_pool_min() -> u32 {
    1
}

fn default_db_pool_max() -> u32 {
    10
}

fn default_retention_days() -> i64 {
    7
}

fn default_tracker_max_open() -> usize {
    500
}

fn default_expiry_minutes() -> i64 {
    5
}

fn default_market_scan_interval_secs() -> u64 {
    15 * 60
}

fn default_bot_scan_interval_secs() -> u64 {
    30 * 60
}

fn default_market_scan_cooldown_secs() -> i64 {
    60 * 60
}

fn default_bot_activity_threshold() -> f64 {
    70.0
}

fn default_market_scan_min_quote_volume() -> f64 {
    5_000_000.0
}

fn default_scanner_concurrency() -> usize {
    10
}

fn default_rate_limit_weight_per_min() -> u32 {
    1_200 * 7 / 10
}

fn default_shutdown_drain_secs() -> u64 {
    30
}

fn default_cache_ttl_fast_secs() -> u64 {
    30
}

fn default_cache_ttl_slow_secs() -> u64 {
    300
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_period_fast() -> usize {
    6
}

fn default_mfi_period() -> usize {
    14
}

fn default_stoch_period() -> usize {
    14
}

fn default_stoch_smoothing() -> usize {
    3
}

fn default_volume_profile_bins() -> usize {
    24
}

fn default_volume_profile_value_area_pct() -> f64 {
    0.70
}

fn default_institutional_min_candles() -> usize {
    200
}

fn default_pivot_window() -> usize {
    3
}

fn default_pivot_cluster_pct() -> f64 {
    0.0025
}

fn default_order_block_atr_multiplier() -> f64 {
    1.5
}

fn default_atr_period() -> usize {
    14
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Aurora signal engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Market data gateway --------------------------------------------------
    /// Symbols the scanners and per-request analyses may observe.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_binance_rest_base")]
    pub exchange_rest_base: String,

    #[serde(default = "default_binance_ws_base")]
    pub exchange_ws_base: String,

    #[serde(default = "default_rest_timeout_secs")]
    pub rest_timeout_secs: u64,

    /// Token-bucket ceiling in request-weight units per rolling minute,
    /// kept at 30% headroom under the exchange's published limit.
    #[serde(default = "default_rate_limit_weight_per_min")]
    pub rate_limit_weight_per_min: u32,

    #[serde(default = "default_cache_ttl_fast_secs")]
    pub cache_ttl_fast_secs: u64,

    #[serde(default = "default_cache_ttl_slow_secs")]
    pub cache_ttl_slow_secs: u64,

    // --- Indicator engine --------------------------------------------------------
    /// Conservative RSI/MFI look-back (spec §4.2 default).
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Fast RSI look-back, used where a quicker signal is preferred.
    #[serde(default = "default_rsi_period_fast")]
    pub rsi_period_fast: usize,

    #[serde(default = "default_mfi_period")]
    pub mfi_period: usize,

    #[serde(default = "default_stoch_period")]
    pub stoch_period: usize,

    #[serde(default = "default_stoch_smoothing")]
    pub stoch_smoothing: usize,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// Number of equal-width price bins the volume profile splits its window into.
    #[serde(default = "default_volume_profile_bins")]
    pub volume_profile_bins: usize,

    /// Fraction of total volume the value area (VAH/VAL) must contain.
    #[serde(default = "default_volume_profile_value_area_pct")]
    pub volume_profile_value_area_pct: f64,

    /// Minimum candle count before institutional indicators (VP/FVG/OB/SMC)
    /// are computed on a 4h/1d series (spec §4.2).
    #[serde(default = "default_institutional_min_candles")]
    pub institutional_min_candles: usize,

    /// Half-width (in bars) of the pivot high/low window.
    #[serde(default = "default_pivot_window")]
    pub pivot_window: usize,

    /// Proximity (as a fraction of price) within which two pivot levels
    /// cluster into one support/resistance level.
    #[serde(default = "default_pivot_cluster_pct")]
    pub pivot_cluster_pct: f64,

    /// Multiple of ATR(14) a displacement move must clear to mark the
    /// preceding candle as an order block.
    #[serde(default = "default_order_block_atr_multiplier")]
    pub order_block_atr_multiplier: f64,

    // --- LLM client ------------------------------------------------------------
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f64,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Per-process cap on concurrently in-flight LLM requests.
    #[serde(default = "default_llm_max_concurrent")]
    pub llm_max_concurrent: usize,

    /// Minimum spacing enforced between two requests to the same endpoint.
    #[serde(default = "default_llm_min_interval_ms")]
    pub llm_min_interval_ms: u64,

    // --- Historical-learning store ---------------------------------------------
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_db_timeout_secs")]
    pub db_timeout_secs: u64,

    #[serde(default = "default_db_pool_min")]
    pub db_pool_min_connections: u32,

    #[serde(default = "default_db_pool_max")]
    pub db_pool_max_connections: u32,

    /// Days a record is retained before the purge task removes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    // --- Price tracker -----------------------------------------------------------
    #[serde(default = "default_tracker_max_open")]
    pub tracker_max_open_positions: usize,

    #[serde(default = "default_expiry_minutes")]
    pub tracker_expiry_minutes: i64,

    // --- Scanners ------------------------------------------------------------------
    #[serde(default = "default_true")]
    pub enable_market_wide_scanner: bool,

    #[serde(default = "default_true")]
    pub enable_bot_activity_scanner: bool,

    #[serde(default = "default_market_scan_interval_secs")]
    pub market_scan_interval_secs: u64,

    #[serde(default = "default_bot_scan_interval_secs")]
    pub bot_scan_interval_secs: u64,

    /// Per-user cooldown between two market-wide-scanner-triggered analyses.
    #[serde(default = "default_market_scan_cooldown_secs")]
    pub market_scan_user_cooldown_secs: i64,

    #[serde(default = "default_bot_activity_threshold")]
    pub bot_activity_score_threshold: f64,

    /// Minimum 24h quote volume (USD) a symbol must clear to be swept by
    /// the market-wide scanner.
    #[serde(default = "default_market_scan_min_quote_volume")]
    pub market_scan_min_quote_volume_usd: f64,

    /// Bounded worker count shared by both scanners (spec §4.10).
    #[serde(default = "default_scanner_concurrency")]
    pub scanner_concurrency: usize,

    // --- Process ------------------------------------------------------------------
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            exchange_rest_base: default_binance_rest_base(),
            exchange_ws_base: default_binance_ws_base(),
            rest_timeout_secs: default_rest_timeout_secs(),
            rate_limit_weight_per_min: default_rate_limit_weight_per_min(),
            cache_ttl_fast_secs: default_cache_ttl_fast_secs(),
            cache_ttl_slow_secs: default_cache_ttl_slow_secs(),
            rsi_period: default_rsi_period(),
            rsi_period_fast: default_rsi_period_fast(),
            mfi_period: default_mfi_period(),
            stoch_period: default_stoch_period(),
            stoch_smoothing: default_stoch_smoothing(),
            atr_period: default_atr_period(),
            volume_profile_bins: default_volume_profile_bins(),
            volume_profile_value_area_pct: default_volume_profile_value_area_pct(),
            institutional_min_candles: default_institutional_min_candles(),
            pivot_window: default_pivot_window(),
            pivot_cluster_pct: default_pivot_cluster_pct(),
            order_block_atr_multiplier: default_order_block_atr_multiplier(),
            llm_endpoint: default_llm_endpoint(),
            llm_model: default_llm_model(),
            llm_temperature: default_llm_temperature(),
            llm_timeout_secs: default_llm_timeout_secs(),
            llm_max_concurrent: default_llm_max_concurrent(),
            llm_min_interval_ms: default_llm_min_interval_ms(),
            db_path: default_db_path(),
            db_timeout_secs: default_db_timeout_secs(),
            db_pool_min_connections: default_db_pool_min(),
            db_pool_max_connections: default_db_pool_max(),
            retention_days: default_retention_days(),
            tracker_max_open_positions: default_tracker_max_open(),
            tracker_expiry_minutes: default_expiry_minutes(),
            enable_market_wide_scanner: true,
            enable_bot_activity_scanner: true,
            market_scan_interval_secs: default_market_scan_interval_secs(),
            bot_scan_interval_secs: default_bot_scan_interval_secs(),
            market_scan_user_cooldown_secs: default_market_scan_cooldown_secs(),
            market_scan_min_quote_volume_usd: default_market_scan_min_quote_volume(),
            scanner_concurrency: default_scanner_concurrency(),
            bot_activity_score_threshold: default_bot_activity_threshold(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
