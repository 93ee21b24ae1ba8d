use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use crate::metrics::{RATE_LIMIT_REJECTIONS, count_request};
use crate::models::IdentityQuery;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/test", get(test_handler))
        .route("/status", get(status_handler))
        .route("/reset", post(reset_handler))
        .route("/stats", get(stats_handler))
}

/// Best guess at who is calling: first `X-Forwarded-For` hop, then the
/// socket peer, then `"unknown"`.
pub struct ClientAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(addr) = forwarded {
            return Ok(ClientAddr(addr.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientAddr(peer))
    }
}

fn identifier(query: IdentityQuery, client: ClientAddr) -> String {
    query.user.filter(|u| !u.is_empty()).unwrap_or(client.0)
}

async fn test_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdentityQuery>,
    client: ClientAddr,
) -> Response {
    count_request("rate-limit");
    let identifier = identifier(query, client);
    let limiter = &state.rate_limiter;
    let decision = limiter.check(&identifier);

    if !decision.allowed {
        RATE_LIMIT_REJECTIONS.inc();
        warn!(%identifier, retry_after = ?decision.retry_after, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Too Many Requests",
                "message": "Rate limit exceeded",
                "retryAfter": decision.retry_after,
                "resetTime": decision.reset_time,
                "limit": limiter.max_requests(),
                "windowMs": limiter.window_ms()
            })),
        )
            .into_response();
    }

    Json(json!({
        "success": true,
        "message": "Request successful",
        "rateLimit": {
            "limit": limiter.max_requests(),
            "remaining": decision.remaining,
            "resetTime": decision.reset_time,
            "windowMs": limiter.window_ms()
        },
        "timestamp": state.clock.now().to_rfc3339()
    }))
    .into_response()
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdentityQuery>,
    client: ClientAddr,
) -> impl IntoResponse {
    Json(state.rate_limiter.status(&identifier(query, client)))
}

async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdentityQuery>,
    client: ClientAddr,
) -> impl IntoResponse {
    let identifier = identifier(query, client);
    state.rate_limiter.reset(&identifier);
    info!(%identifier, "rate limit reset");

    Json(json!({
        "message": "Rate limit reset successfully",
        "identifier": identifier
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let limiter = &state.rate_limiter;

    Json(json!({
        "totalUsers": limiter.tracked_identifiers(),
        "rateLimitConfig": {
            "maxRequests": limiter.max_requests(),
            "windowMs": limiter.window_ms(),
            "windowSeconds": limiter.window_ms() / 1000
        },
        "users": limiter.stats()
    }))
}
