use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use spool_core::EnqueueSummary;
use spool_model::{IngestionEvent, ProjectId};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct IngestionRequest {
    pub batch: Vec<IngestionEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestionResponse {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub summary: EnqueueSummary,
}

/// `POST /api/v1/projects/{project_id}/ingestion`
///
/// Responds `202 Accepted` once every event is buffered and its flush is
/// scheduled. A failed batch may already be partially buffered; clients
/// retry the whole batch.
pub async fn ingest_batch_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<IngestionRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<IngestionResponse>)> {
    let project_id = project_id.trim();
    if project_id.is_empty() {
        return Err(AppError::bad_request("project id must not be empty"));
    }
    let project_id = ProjectId::new(project_id);
    let Json(request) = payload?;

    let request_id = Uuid::now_v7();
    let span = info_span!(
        "ingest_batch",
        %request_id,
        project_id = %project_id,
        events = request.batch.len()
    );

    let summary = state
        .enqueuer()
        .enqueue_batch(&project_id, request.batch)
        .instrument(span)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestionResponse {
            request_id,
            summary,
        }),
    ))
}
