// =============================================================================
// REST API — Axum 0.7
// =============================================================================
//
// This is not a dashboard: the engine's actual surface is the Command API
// (`AnalysisOrchestrator::analyze/history/summary`), consumed in-process by
// collaborators that embed this crate. What's exposed over HTTP is ambient
// operator surface only — liveness, readiness, and rate-limit diagnostics.
//
// `/api/v1/health` is public; everything else requires a bearer token.
// =============================================================================

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/ready", get(ready))
        .route("/api/v1/rate-limit", get(rate_limit))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    uptime_secs: u64,
    analyses_served: u64,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.uptime_secs(),
        analyses_served: state.analyses_served(),
    })
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
}

/// Readiness beyond process liveness: confirm the store pool still answers.
async fn ready(_auth: AuthBearer, State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => Json(ReadyResponse { status: "ready" }).into_response(),
        Err(err) => (axum::http::StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "not_ready", "error": err.to_string() }))).into_response(),
    }
}

/// Exposes the process-wide rate-limit bucket so an operator can see
/// remaining exchange-API headroom without reading logs.
async fn rate_limit(_auth: AuthBearer, State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.gateway_rate_limit_snapshot())
}
