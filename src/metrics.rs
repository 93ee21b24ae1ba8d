use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref DEMO_REQUESTS: CounterVec = register_counter_vec!(
        "portfolio_demo_requests_total",
        "Total number of demo requests, by demo",
        &["demo"]
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("portfolio_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("portfolio_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("portfolio_cache_size", "Current number of items in cache").unwrap();
    pub static ref CACHE_RESPONSE_LATENCY: Histogram = register_histogram!(
        "portfolio_cache_response_latency_seconds",
        "Latency of the cached/uncached demo endpoints in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_REJECTIONS: Counter = register_counter!(
        "portfolio_rate_limit_rejections_total",
        "Requests rejected by the sliding-window limiter"
    )
    .unwrap();
    pub static ref WEBHOOKS_ACCEPTED: Counter =
        register_counter!("portfolio_webhooks_accepted_total", "Webhooks processed").unwrap();
    pub static ref WEBHOOKS_DUPLICATE: Counter = register_counter!(
        "portfolio_webhooks_duplicate_total",
        "Webhook deliveries ignored as duplicates"
    )
    .unwrap();
    pub static ref UPLOADS_STARTED: Counter =
        register_counter!("portfolio_uploads_started_total", "Upload sessions created").unwrap();
    pub static ref UPLOADS_COMPLETED: Counter = register_counter!(
        "portfolio_uploads_completed_total",
        "Uploads that finished the processing pipeline"
    )
    .unwrap();
}

pub fn count_request(demo: &str) {
    DEMO_REQUESTS.with_label_values(&[demo]).inc();
}
