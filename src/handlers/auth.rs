use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use crate::auth::{ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL};
use crate::error::{AppError, AppResult};
use crate::metrics::count_request;
use crate::models::{DecodeRequest, LoginRequest, RefreshRequest};
use crate::state::AppState;
use crate::token::{Verification, decode_parts};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login_handler))
        .route("/verify", post(verify_handler))
        .route("/refresh", post(refresh_handler))
        .route("/decode", post(decode_handler))
        .route("/protected", get(protected_handler))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

fn preview(segment: &str) -> String {
    format!("{}...", segment.chars().take(20).collect::<String>())
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    count_request("auth");

    let tokens = state
        .auth
        .login(&payload.username, &payload.password)
        .ok_or_else(|| {
            AppError::unauthorized("Invalid credentials", "Username or password is incorrect")
        })?;

    Ok(Json(json!({
        "success": true,
        "accessToken": tokens.access_token,
        "refreshToken": tokens.refresh_token,
        "user": tokens.user,
        "tokenInfo": {
            "accessTokenExpiry": format!("{} minutes", ACCESS_TOKEN_TTL / 60),
            "refreshTokenExpiry": format!("{} days", REFRESH_TOKEN_TTL / 86_400)
        }
    })))
}

async fn verify_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    count_request("auth");

    let Some(token) = bearer_token(&headers) else {
        return AppError::unauthorized("No token provided", "Authorization header is required")
            .into_response();
    };

    match state.auth.issuer.verify(token) {
        Verification::Valid { payload } => {
            let minutes = state.auth.issuer.seconds_remaining(&payload).unwrap_or(0) / 60;
            Json(json!({
                "valid": true,
                "payload": payload,
                "timeRemaining": format!("{minutes} minutes")
            }))
            .into_response()
        }
        Verification::Invalid { reason, expired_at, .. } => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "valid": false,
                "error": reason.to_string(),
                "expiredAt": expired_at
            })),
        )
            .into_response(),
    }
}

async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<impl IntoResponse> {
    count_request("auth");

    let refresh_token = payload
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Refresh token required".into()))?;

    let refreshed = state.auth.refresh(&refresh_token).ok_or_else(|| {
        AppError::unauthorized(
            "Invalid or expired refresh token",
            "Log in again to obtain a new refresh token",
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "accessToken": refreshed.access_token,
        "tokenInfo": {
            "accessTokenExpiry": format!("{} minutes", ACCESS_TOKEN_TTL / 60),
            "refreshTokenIssuedAt": refreshed.refresh_issued_at.to_rfc3339()
        }
    })))
}

// Shows what a token carries, nothing is verified here
async fn decode_handler(Json(payload): Json<DecodeRequest>) -> AppResult<impl IntoResponse> {
    count_request("auth");

    let token = payload
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Token required".into()))?;

    let decoded = decode_parts(&token)
        .map_err(|e| AppError::BadRequest(format!("Invalid token format: {e}")))?;
    let segments: Vec<&str> = token.split('.').collect();

    Ok(Json(json!({
        "token": {
            "header": decoded.header,
            "payload": decoded.payload,
            "signature": preview(&decoded.signature)
        },
        "visualization": {
            "structure": "header.payload.signature",
            "parts": {
                "header": preview(segments[0]),
                "payload": preview(segments[1]),
                "signature": preview(segments[2])
            }
        }
    })))
}

async fn protected_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    count_request("auth");

    let token = bearer_token(&headers).ok_or_else(|| {
        AppError::unauthorized("Authentication required", "Please provide a valid access token")
    })?;

    match state.auth.issuer.verify(token) {
        Verification::Valid { payload } => Ok(Json(json!({
            "message": "Access granted to protected resource!",
            "user": payload,
            "accessedAt": state.clock.now().to_rfc3339()
        }))),
        Verification::Invalid { reason, .. } => {
            Err(AppError::unauthorized("Unauthorized", reason.to_string()))
        }
    }
}
