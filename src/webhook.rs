use chrono::{DateTime, Utc};
use dashmap::DashSet;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use crate::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

const RECENT_LOGS: usize = 20;

/// Hex HMAC-SHA256 of the compact JSON form of `payload`.
pub fn sign_payload(secret: &str, payload: &Value) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Exact match against [`sign_payload`]'s output: lower-case hex only.
pub fn verify_signature(secret: &str, payload: &Value, signature: &str) -> bool {
    if signature.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.to_string().as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WebhookRejection {
    #[error("x-webhook-signature header is required")]
    MissingSignature,

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Webhook ID is required for idempotency")]
    MissingId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Accepted { id: String },
    Duplicate { id: String },
}

// What the receiver needs out of an inbound request
pub struct InboundWebhook<'a> {
    pub signature: Option<&'a str>,
    pub secret: Option<&'a str>,
    pub id_header: Option<&'a str>,
    pub body: &'a Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub data: Value,
    pub processed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLogSummary {
    pub total_processed: usize,
    pub recent_webhooks: Vec<WebhookLog>,
    pub unique_events: Vec<String>,
}

/// Signature check plus at-most-once processing per webhook id.
pub struct WebhookReceiver {
    processed: DashSet<String>,
    logs: Mutex<Vec<WebhookLog>>,
    default_secret: String,
    clock: Arc<dyn Clock>,
}

fn webhook_id(body: &Value, header: Option<&str>) -> Option<String> {
    match body.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => header.filter(|h| !h.is_empty()).map(str::to_string),
    }
}

impl WebhookReceiver {
    pub fn new(default_secret: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            processed: DashSet::new(),
            logs: Mutex::new(Vec::new()),
            default_secret: default_secret.into(),
            clock,
        }
    }

    pub fn default_secret(&self) -> &str {
        &self.default_secret
    }

    /// Verify and record one delivery.
    ///
    /// The signature is checked before the id is looked at, so a bad
    /// signature is rejected even for an id never seen before. A repeated id
    /// is not an error: it comes back as [`Delivery::Duplicate`].
    pub fn receive(&self, inbound: InboundWebhook<'_>) -> Result<Delivery, WebhookRejection> {
        let signature = inbound.signature.ok_or(WebhookRejection::MissingSignature)?;
        let secret = inbound.secret.unwrap_or(&self.default_secret);

        if !verify_signature(secret, inbound.body, signature) {
            warn!("webhook signature mismatch");
            return Err(WebhookRejection::InvalidSignature);
        }

        let id = webhook_id(inbound.body, inbound.id_header).ok_or(WebhookRejection::MissingId)?;

        // insert() is the claim, only one caller per id gets true
        if !self.processed.insert(id.clone()) {
            info!(webhook_id = %id, "duplicate webhook ignored");
            return Ok(Delivery::Duplicate { id });
        }

        let event = inbound
            .body
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(WebhookLog {
                id: id.clone(),
                timestamp: self.clock.now(),
                event,
                data: inbound.body.get("data").cloned().unwrap_or(Value::Null),
                processed: true,
            });
        info!(webhook_id = %id, "webhook accepted");

        Ok(Delivery::Accepted { id })
    }

    pub fn summary(&self) -> WebhookLogSummary {
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());

        let mut unique_events: Vec<String> = Vec::new();
        for log in logs.iter() {
            if !unique_events.contains(&log.event) {
                unique_events.push(log.event.clone());
            }
        }

        WebhookLogSummary {
            total_processed: self.processed.len(),
            recent_webhooks: logs.iter().rev().take(RECENT_LOGS).cloned().collect(),
            unique_events,
        }
    }

    pub fn reset(&self) {
        self.processed.clear();
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn receiver() -> WebhookReceiver {
        WebhookReceiver::new("demo-secret-key", Arc::new(ManualClock::default()))
    }

    fn inbound<'a>(signature: &'a str, body: &'a Value) -> InboundWebhook<'a> {
        InboundWebhook {
            signature: Some(signature),
            secret: None,
            id_header: None,
            body,
        }
    }

    #[test]
    fn signature_is_hex_hmac_of_compact_json() {
        let body = json!({ "b": 1, "a": 2 });
        let signature = sign_payload("k", &body);

        assert_eq!(signature.len(), 64);
        assert!(verify_signature("k", &body, &signature));
        assert!(!verify_signature("other", &body, &signature));
        assert!(!verify_signature("k", &json!({ "a": 2, "b": 1 }), &signature));
        assert!(!verify_signature("k", &body, "not-hex"));
        assert!(!verify_signature("k", &body, &signature.to_uppercase()));
    }

    #[test]
    fn duplicate_delivery_is_processed_once() {
        let receiver = receiver();
        let body = json!({ "id": "evt_1", "event": "payment.succeeded", "data": { "amount": 10 } });
        let signature = sign_payload("demo-secret-key", &body);

        assert_eq!(
            receiver.receive(inbound(&signature, &body)),
            Ok(Delivery::Accepted { id: "evt_1".into() })
        );
        assert_eq!(
            receiver.receive(inbound(&signature, &body)),
            Ok(Delivery::Duplicate { id: "evt_1".into() })
        );

        let summary = receiver.summary();
        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.recent_webhooks.len(), 1);
        assert_eq!(summary.unique_events, vec!["payment.succeeded".to_string()]);
    }

    #[test]
    fn invalid_signature_rejected_even_for_new_id() {
        let receiver = receiver();
        let body = json!({ "id": "evt_2" });

        assert_eq!(
            receiver.receive(inbound(&"0".repeat(64), &body)),
            Err(WebhookRejection::InvalidSignature)
        );
        // the id was not burned by the failed attempt
        let signature = sign_payload("demo-secret-key", &body);
        assert!(matches!(
            receiver.receive(inbound(&signature, &body)),
            Ok(Delivery::Accepted { .. })
        ));
        assert_eq!(
            receiver.receive(inbound("00", &body)),
            Err(WebhookRejection::InvalidSignature)
        );
    }

    #[test]
    fn missing_signature_and_missing_id_are_rejected() {
        let receiver = receiver();
        let body = json!({ "event": "x" });

        let unsigned = InboundWebhook { signature: None, secret: None, id_header: None, body: &body };
        assert_eq!(receiver.receive(unsigned), Err(WebhookRejection::MissingSignature));

        let signature = sign_payload("demo-secret-key", &body);
        assert_eq!(
            receiver.receive(inbound(&signature, &body)),
            Err(WebhookRejection::MissingId)
        );
    }

    #[test]
    fn id_and_secret_can_come_from_headers() {
        let receiver = receiver();
        let body = json!({ "event": "ping" });
        let signature = sign_payload("custom", &body);

        let request = InboundWebhook {
            signature: Some(&signature),
            secret: Some("custom"),
            id_header: Some("hdr-1"),
            body: &body,
        };
        assert_eq!(receiver.receive(request), Ok(Delivery::Accepted { id: "hdr-1".into() }));
    }

    #[test]
    fn summary_lists_newest_first_and_reset_clears() {
        let receiver = receiver();
        for i in 0..25 {
            let body = json!({ "id": i, "event": if i % 2 == 0 { "even" } else { "odd" } });
            let signature = sign_payload("demo-secret-key", &body);
            receiver.receive(inbound(&signature, &body)).unwrap();
        }

        let summary = receiver.summary();
        assert_eq!(summary.total_processed, 25);
        assert_eq!(summary.recent_webhooks.len(), 20);
        assert_eq!(summary.recent_webhooks[0].id, "24");
        assert_eq!(summary.unique_events, vec!["even".to_string(), "odd".to_string()]);

        receiver.reset();
        assert_eq!(receiver.summary().total_processed, 0);
        assert!(receiver.summary().recent_webhooks.is_empty());
    }
}
