use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use crate::auth::AuthService;
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::Args;
use crate::database::MockDatabase;
use crate::rate_limit::SlidingWindowLimiter;
use crate::retry::UnreliableApi;
use crate::upload::UploadTracker;
use crate::webhook::WebhookReceiver;

// app's shared state, one container per demo

pub struct AppState {
    pub client: reqwest::Client,
    pub clock: Arc<dyn Clock>,
    pub started_at: DateTime<Utc>,
    pub cache: Arc<TtlCache<Value>>,
    pub cache_ttl: Duration,       // how long the demo payload stays cached
    pub slow_api_delay: Duration,  // latency of the simulated upstream
    pub rate_limiter: SlidingWindowLimiter,
    pub auth: AuthService,
    pub webhooks: WebhookReceiver,
    pub proxy_secret: String,
    pub retry: UnreliableApi,
    pub database: MockDatabase,
    pub uploads: Arc<UploadTracker>,
}

impl AppState {
    pub fn new(args: &Args, clock: Arc<dyn Clock>) -> Arc<Self> {
        let now = clock.now();

        Arc::new(Self {
            client: reqwest::Client::new(),
            clock: clock.clone(),
            started_at: now,
            cache: Arc::new(TtlCache::new(clock.clone())),
            cache_ttl: Duration::from_secs(args.cache_ttl),
            slow_api_delay: Duration::from_millis(args.cache_api_delay_ms),
            rate_limiter: SlidingWindowLimiter::new(
                args.rate_limit,
                Duration::from_secs(args.rate_window),
                clock.clone(),
            ),
            auth: AuthService::new(&args.jwt_secret, clock.clone()),
            webhooks: WebhookReceiver::new(args.webhook_secret.clone(), clock.clone()),
            proxy_secret: args.proxy_secret.clone(),
            retry: UnreliableApi::new(clock.clone()),
            database: MockDatabase::generate(&mut rand::thread_rng(), now),
            uploads: Arc::new(UploadTracker::new(clock)),
        })
    }
}
