use axum::{Json, extract::State, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

// health handler
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = state.clock.now();
    let uptime = (now - state.started_at).num_milliseconds() as f64 / 1000.0;

    Json(json!({
        "status": "healthy",
        "timestamp": now.to_rfc3339(),
        "uptime": uptime,
        "activeUploads": state.uploads.active_sessions()
    }))
}

// index of the demo route groups
pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Portfolio Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "retry": "/api/demo/retry",
            "webhook": "/api/demo/webhook",
            "webhookProxy": "/api/demo/webhook-proxy",
            "database": "/api/demo/database",
            "rateLimit": "/api/demo/rate-limit",
            "cache": "/api/demo/cache",
            "auth": "/api/demo/auth",
            "video": "/api/demo/video"
        }
    }))
}

pub async fn metrics_handler() -> AppResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
}
