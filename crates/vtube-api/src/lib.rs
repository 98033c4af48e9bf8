//! Axum HTTP API server.
//!
//! This crate provides:
//! - The publish intake (placeholder record + job enqueue)
//! - Multipart upload handling into a local staging directory
//! - Access-token authentication
//! - Rate limiting, security headers and Prometheus metrics
//! - A reconciliation sweep for records stuck in `processing`

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
pub mod uploads;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use intake::{IntakeError, PublishIntake, PublishRequest};
pub use routes::create_router;
pub use services::StaleVideoDetector;
pub use state::AppState;
