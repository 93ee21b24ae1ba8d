use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use crate::clock::Clock;
use crate::token::{Claims, TokenIssuer};

pub const ACCESS_TOKEN_TTL: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct DemoUser {
    pub id: u64,
    pub username: &'static str,
    #[serde(skip)]
    pub password: &'static str,
    pub role: &'static str,
}

// Hard-coded accounts for the login demo
pub const DEMO_USERS: [DemoUser; 2] = [
    DemoUser { id: 1, username: "demo", password: "password123", role: "admin" },
    DemoUser { id: 2, username: "user", password: "user123", role: "user" },
];

pub struct RefreshRecord {
    pub user_id: u64,
    pub created_at: DateTime<Utc>,
}

pub struct RefreshedAccess {
    pub access_token: String,
    pub refresh_issued_at: DateTime<Utc>,
}

pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: DemoUser,
}

/// Login, refresh and token checks on top of a [`TokenIssuer`].
pub struct AuthService {
    pub issuer: TokenIssuer,
    refresh_tokens: DashMap<String, RefreshRecord>,
    clock: Arc<dyn Clock>,
}

fn claims(value: Value) -> Claims {
    match value {
        Value::Object(map) => map,
        _ => Claims::new(),
    }
}

impl AuthService {
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: TokenIssuer::new(secret, clock.clone()),
            refresh_tokens: DashMap::new(),
            clock,
        }
    }

    fn access_token_for(&self, user: &DemoUser) -> String {
        self.issuer.sign(
            claims(json!({ "userId": user.id, "username": user.username, "role": user.role })),
            ACCESS_TOKEN_TTL,
        )
    }

    pub fn login(&self, username: &str, password: &str) -> Option<LoginTokens> {
        let user = DEMO_USERS
            .iter()
            .find(|u| u.username == username && u.password == password)?;

        let access_token = self.access_token_for(user);
        let refresh_token = self.issuer.sign(
            claims(json!({ "userId": user.id, "type": "refresh" })),
            REFRESH_TOKEN_TTL,
        );

        self.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshRecord {
                user_id: user.id,
                created_at: self.clock.now(),
            },
        );
        info!(user = user.username, "issued token pair");

        Some(LoginTokens {
            access_token,
            refresh_token,
            user: user.clone(),
        })
    }

    /// New access token for a refresh token this service issued and that
    /// still verifies.
    pub fn refresh(&self, refresh_token: &str) -> Option<RefreshedAccess> {
        if !self.issuer.verify(refresh_token).is_valid() {
            return None;
        }
        let (user_id, refresh_issued_at) = {
            let record = self.refresh_tokens.get(refresh_token)?;
            (record.user_id, record.created_at)
        };
        let user = DEMO_USERS.iter().find(|u| u.id == user_id)?;

        Some(RefreshedAccess {
            access_token: self.access_token_for(user),
            refresh_issued_at,
        })
    }

    pub fn refresh_tokens_issued(&self) -> usize {
        self.refresh_tokens.len()
    }
}
