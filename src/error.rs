// =============================================================================
// Domain error types
//
// Each subsystem gets its own thiserror enum; anyhow is reserved for the
// call sites in main.rs and the HTTP plumbing that glue subsystems together.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("exchange request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("exchange returned malformed payload: {0}")]
    MalformedResponse(String),
    #[error("stream for {symbol}@{interval} disconnected: {reason}")]
    StreamClosed { symbol: String, interval: String, reason: String },
    #[error("rate limit exhausted, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("insufficient candles: need {need}, have {have}")]
    InsufficientData { need: usize, have: usize },
    #[error("invalid period: {0}")]
    InvalidPeriod(usize),
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("request to LLM endpoint failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM endpoint returned non-success status {0}")]
    BadStatus(u16),
    #[error("LLM response could not be recovered into a recommendation")]
    Unrecoverable,
    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("take-profits are not monotonic in the trade direction")]
    NonMonotonicTakeProfits,
    #[error("stop-loss is on the wrong side of entry for a {0} recommendation")]
    StopLossWrongSide(crate::types::Side),
    #[error("confidence {0} outside [0, 100]")]
    ConfidenceOutOfRange(f64),
    #[error("asset type echoed by the model ({echoed}) does not match the classifier ({expected})")]
    AssetTypeMismatch { echoed: String, expected: String },
    #[error("recommendation missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record {0} is already resolved")]
    AlreadyResolved(String),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("gateway error while tracking: {0}")]
    Gateway(#[from] DataError),
    #[error("store error while resolving: {0}")]
    Store(#[from] StoreError),
    #[error("analysis {0} is not in an open state")]
    NotOpen(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Llm(#[from] LLMError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("analysis budget exceeded for this process")]
    ConcurrencyBudgetExceeded,
}
