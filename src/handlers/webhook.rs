use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use rand::Rng;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, SERVER, USER_AGENT};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};
use crate::error::{AppError, AppResult};
use crate::metrics::{WEBHOOKS_ACCEPTED, WEBHOOKS_DUPLICATE, count_request};
use crate::models::{SecretQuery, SendWebhookRequest};
use crate::state::AppState;
use crate::webhook::{Delivery, InboundWebhook, sign_payload};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/receive", post(receive_handler))
        .route("/generate-signature", post(generate_signature_handler))
        .route("/logs", get(logs_handler))
        .route("/reset", post(reset_handler))
}

pub fn proxy_routes() -> Router<Arc<AppState>> {
    Router::new().route("/send", post(send_handler))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn receive_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<impl IntoResponse> {
    count_request("webhook");

    let delivery = state.webhooks.receive(InboundWebhook {
        signature: header(&headers, "x-webhook-signature"),
        secret: header(&headers, "x-webhook-secret"),
        id_header: header(&headers, "x-webhook-id"),
        body: &body,
    })?;

    let id = match delivery {
        Delivery::Duplicate { id } => {
            WEBHOOKS_DUPLICATE.inc();
            return Ok(Json(json!({
                "success": true,
                "message": "Webhook already processed (idempotent)",
                "webhookId": id,
                "duplicate": true
            })));
        }
        Delivery::Accepted { id } => id,
    };
    WEBHOOKS_ACCEPTED.inc();

    // simulated processing time
    let processing_ms = rand::thread_rng().gen_range(100..600);
    sleep(Duration::from_millis(processing_ms)).await;

    Ok(Json(json!({
        "success": true,
        "message": "Webhook processed successfully",
        "webhookId": id,
        "processingTime": format!("{processing_ms}ms"),
        "timestamp": state.clock.now().to_rfc3339()
    })))
}

async fn generate_signature_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let secret = query
        .secret
        .unwrap_or_else(|| state.webhooks.default_secret().to_string());
    let signature = sign_payload(&secret, &body);

    Json(json!({
        "signature": signature,
        "payload": body,
        "secret": secret,
        "instructions": {
            "headerName": "x-webhook-signature",
            "headerValue": signature
        }
    }))
}

async fn logs_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.webhooks.summary())
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.webhooks.reset();
    info!("webhook log reset");
    Json(json!({ "message": "Webhook data reset successfully" }))
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Signs the payload and forwards it, so the browser never hits CORS
async fn send_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendWebhookRequest>,
) -> AppResult<impl IntoResponse> {
    count_request("webhook-proxy");

    let url = request
        .webhook_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("webhookUrl is required".into()))?;
    let payload = request.payload;
    let signature = sign_payload(&state.proxy_secret, &payload);
    let start = Instant::now();

    let mut outbound = state
        .client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, concat!("portfolio-demos-webhook/", env!("CARGO_PKG_VERSION")))
        .header("X-Webhook-Signature", signature.as_str());
    for (name, field) in [
        ("X-Webhook-Id", "id"),
        ("X-Event-Type", "event"),
        ("X-Timestamp", "timestamp"),
    ] {
        if let Some(value) = payload.get(field) {
            outbound = outbound.header(name, header_text(value));
        }
    }

    let response = outbound.body(payload.to_string()).send().await.map_err(|e| {
        warn!(%url, error = %e, "webhook proxy request failed");
        AppError::Upstream(e.to_string())
    })?;
    let response_time = start.elapsed().as_millis();

    let status = response.status();
    let response_header = |name| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_type = response_header(CONTENT_TYPE);
    let content_length = response_header(CONTENT_LENGTH);
    let server = response_header(SERVER);

    let is_json = content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("application/json"));
    let response_body = if is_json {
        response.json::<Value>().await.unwrap_or(Value::Null)
    } else {
        response.text().await.map(Value::String).unwrap_or(Value::Null)
    };
    info!(%url, status = status.as_u16(), "webhook forwarded");

    Ok(Json(json!({
        "success": status.is_success(),
        "status": status.as_u16(),
        "statusText": status.canonical_reason().unwrap_or(""),
        "responseTime": format!("{response_time}ms"),
        "webhookId": payload.get("id"),
        "signature": format!("{}...", &signature[..20]),
        "fullSignature": signature,
        "headers": {
            "content-type": content_type,
            "content-length": content_length,
            "server": server
        },
        "responseBody": response_body
    })))
}
