pub mod auth;
pub mod cache;
pub mod database;
pub mod rate_limit;
pub mod retry;
pub mod upload;
pub mod webhook;
mod health;

pub use health::{health_handler, metrics_handler, root_handler};
