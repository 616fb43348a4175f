//! HTTP surface for Spool ingestion.
//!
//! Accepts event batches per project, buffers them through
//! [`spool_core::IngestionEnqueuer`] and reports collaborator health.

#![allow(missing_docs)]

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::{AppState, Backend};
pub use infra::errors::{AppError, AppResult};

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use handlers::health::{health_handler, ping_handler};

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(routes::create_api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
