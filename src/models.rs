use serde::Deserialize;
use serde_json::Value;

// Request bodies and query strings for the demo endpoints.
// Missing fields default so handlers can answer with a 400 of their own.

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct DecodeRequest {
    pub token: Option<String>,
}

// ?user= picks the rate-limit identifier explicitly
#[derive(Deserialize, Default)]
pub struct IdentityQuery {
    pub user: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnreliableQuery {
    pub attempt: Option<u32>,
    pub failure_rate: Option<f64>,
    pub request_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkRequest {
    pub chunk_index: Option<u32>,
    pub chunk_size: Option<u64>,
    // accepted, never validated
    pub checksum: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SendWebhookRequest {
    pub webhook_url: Option<String>,
    pub payload: Value,
}
