use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use crate::metrics::count_request;
use crate::models::UnreliableQuery;
use crate::retry::{CallOutcome, DEFAULT_FAILURE_RATE};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/unreliable-api", get(unreliable_handler))
        .route("/stats", get(stats_handler))
        .route("/reset", post(reset_handler))
}

async fn unreliable_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnreliableQuery>,
) -> Response {
    count_request("retry");
    let attempt = query.attempt.filter(|a| *a > 0).unwrap_or(1);
    let failure_rate = query.failure_rate.unwrap_or(DEFAULT_FAILURE_RATE);
    let timestamp = state.clock.now().to_rfc3339();

    match state.retry.call(attempt, failure_rate, query.request_id) {
        CallOutcome::Success { total_requests } => Json(json!({
            "success": true,
            "data": {
                "message": "Request successful!",
                "attempt": attempt,
                "timestamp": timestamp,
                "totalRequests": total_requests
            }
        }))
        .into_response(),
        CallOutcome::Failure { status, message } => {
            debug!(attempt, status, "simulated failure");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({
                    "success": false,
                    "error": message,
                    "attempt": attempt,
                    "timestamp": timestamp
                })),
            )
                .into_response()
        }
    }
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.retry.stats())
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.retry.reset();
    Json(json!({ "message": "Stats reset successfully" }))
}
