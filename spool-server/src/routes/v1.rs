use axum::{Router, routing::post};

use crate::{AppState, handlers::ingestion};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new().route(
        "/projects/{project_id}/ingestion",
        post(ingestion::ingest_batch_handler),
    )
}
