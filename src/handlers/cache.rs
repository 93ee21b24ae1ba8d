use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::{Instant, sleep};
use tracing::info;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_RESPONSE_LATENCY, CACHE_SIZE, count_request};
use crate::state::AppState;

const CACHE_KEY: &str = "api-data";
// what a cache hit typically costs, used for the savings estimate
const CACHED_RESPONSE_MS: u64 = 5;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/with-cache", get(with_cache_handler))
        .route("/without-cache", get(without_cache_handler))
        .route("/stats", get(stats_handler))
        .route("/clear", post(clear_handler))
}

// Stand-in for an expensive upstream call
async fn slow_api_call(state: &AppState) -> Value {
    sleep(state.slow_api_delay).await;
    json!({
        "timestamp": state.clock.now().to_rfc3339(),
        "randomValue": rand::random::<f64>(),
        "message": "This data took a while to fetch!"
    })
}

fn elapsed_ms(start: Instant) -> u128 {
    let elapsed = start.elapsed();
    CACHE_RESPONSE_LATENCY.observe(elapsed.as_secs_f64());
    elapsed.as_millis()
}

async fn with_cache_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    count_request("cache");
    let start = Instant::now();

    if let Some(data) = state.cache.get(CACHE_KEY) {
        CACHE_HITS.inc();
        return Json(json!({
            "source": "cache",
            "data": data,
            "performance": {
                "responseTime": format!("{}ms", elapsed_ms(start)),
                "cacheHit": true
            },
            "cacheStats": state.cache.stats()
        }));
    }
    CACHE_MISSES.inc();
    info!("cache miss, calling slow api");

    let data = slow_api_call(&state).await;
    state.cache.set(CACHE_KEY, data.clone(), state.cache_ttl);
    CACHE_SIZE.set(state.cache.len() as f64);

    Json(json!({
        "source": "api",
        "data": data,
        "performance": {
            "responseTime": format!("{}ms", elapsed_ms(start)),
            "cacheHit": false,
            "cachedFor": format!("{} seconds", state.cache_ttl.as_secs())
        },
        "cacheStats": state.cache.stats()
    }))
}

async fn without_cache_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    count_request("cache");
    let start = Instant::now();
    let data = slow_api_call(&state).await;

    Json(json!({
        "source": "api",
        "data": data,
        "performance": {
            "responseTime": format!("{}ms", elapsed_ms(start)),
            "cached": false
        }
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.cache.stats();
    let api_ms = state.slow_api_delay.as_millis() as u64;
    let saved = api_ms.saturating_sub(CACHED_RESPONSE_MS);

    let improvement = if stats.hits > 0 && api_ms > 0 {
        format!(
            "{:.1}% faster ({}ms saved per cached request)",
            saved as f64 / api_ms as f64 * 100.0,
            saved
        )
    } else {
        "No cache hits yet".to_string()
    };

    Json(json!({
        "hits": stats.hits,
        "misses": stats.misses,
        "sets": stats.sets,
        "hitRate": stats.hit_rate,
        "size": stats.size,
        "performanceImprovement": improvement,
        "cacheEntries": state.cache.keys()
    }))
}

async fn clear_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.cache.clear();
    CACHE_SIZE.set(0.0);
    info!("cache cleared");
    Json(json!({ "message": "Cache cleared successfully" }))
}
