pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod state;
pub mod token;
pub mod upload;
pub mod webhook;

use axum::{Router, http::HeaderValue, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cache::cache_sweeper;
use crate::clock::SystemClock;
use crate::config::Args;
use crate::state::AppState;

/// Builds the full router: every demo under `/api/demo/*` plus the index,
/// health and metrics endpoints.
pub fn app(state: Arc<AppState>, allowed_origin: &str) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/demo/retry", handlers::retry::routes())
        .nest("/api/demo/webhook", handlers::webhook::routes())
        .nest("/api/demo/webhook-proxy", handlers::webhook::proxy_routes())
        .nest("/api/demo/database", handlers::database::routes())
        .nest("/api/demo/rate-limit", handlers::rate_limit::routes())
        .nest("/api/demo/cache", handlers::cache::routes())
        .nest("/api/demo/auth", handlers::auth::routes())
        .nest("/api/demo/video", handlers::upload::routes())
        .layer(cors_layer(allowed_origin))
        .with_state(state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origin == "*" {
        return layer.allow_origin(Any);
    }
    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!(allowed_origin, "unparseable CORS origin, allowing any");
            layer.allow_origin(Any)
        }
    }
}

pub async fn start_server(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState::new(&args, Arc::new(SystemClock));

    // expired cache entries are dropped in the background
    tokio::spawn(cache_sweeper(
        state.cache.clone(),
        Duration::from_secs(args.cache_sweep_interval.max(1)),
    ));

    let router = app(state, &args.allowed_origin);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "portfolio demos listening");
    info!(
        cache_ttl = args.cache_ttl,
        rate_limit = args.rate_limit,
        rate_window = args.rate_window,
        "demo settings"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("portfolio demos stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
