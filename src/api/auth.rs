// =============================================================================
// Bearer-token authentication — constant-time comparison
// =============================================================================
//
// Every Command API route other than `/health` requires `Authorization:
// Bearer <token>` where `<token>` matches `AURORA_SIGNAL_ENGINE_TOKEN`.
// Comparison is constant-time so response latency can't leak how many
// leading bytes of a guessed token were correct.
// =============================================================================

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extractor that succeeds only when the request carries a valid bearer
/// token. Holds the raw token so handlers can thread it through if needed.
pub struct AuthBearer(pub String);

pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthRejection { status: StatusCode::UNAUTHORIZED, message: "missing Authorization header" })?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthRejection { status: StatusCode::UNAUTHORIZED, message: "Authorization header is not a Bearer token" })?;

        if !validate_token(token) {
            return Err(AuthRejection { status: StatusCode::UNAUTHORIZED, message: "invalid bearer token" });
        }

        Ok(AuthBearer(token.to_string()))
    }
}

/// Standalone validity check, used by the extractor above and available to
/// any call site that authenticates outside the extractor machinery.
pub fn validate_token(token: &str) -> bool {
    let expected = std::env::var("AURORA_SIGNAL_ENGINE_TOKEN").unwrap_or_default();
    !expected.is_empty() && constant_time_eq(token.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_slices_match() {
        assert!(constant_time_eq(b"secret-token", b"secret-token"));
    }

    #[test]
    fn different_lengths_never_match() {
        assert!(!constant_time_eq(b"short", b"much-longer-value"));
    }

    #[test]
    fn single_byte_difference_fails() {
        assert!(!constant_time_eq(b"secret-token", b"secret-tokeN"));
    }

    #[test]
    fn empty_expected_token_never_validates() {
        std::env::remove_var("AURORA_SIGNAL_ENGINE_TOKEN");
        assert!(!validate_token("anything"));
    }

    #[test]
    fn matching_env_token_validates() {
        std::env::set_var("AURORA_SIGNAL_ENGINE_TOKEN", "integration-test-token");
        assert!(validate_token("integration-test-token"));
        assert!(!validate_token("wrong-token"));
        std::env::remove_var("AURORA_SIGNAL_ENGINE_TOKEN");
    }
}
