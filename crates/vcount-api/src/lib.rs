//! Axum HTTP API for video object counting.
//!
//! This crate provides:
//! - Synchronous upload-and-analyze and background job endpoints
//! - History listing and lookup
//! - Rate limiting, security headers and request ids
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
