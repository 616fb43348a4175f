use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn ping_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    let mut health_status = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend.as_str(),
        "checks": {}
    });
    let mut is_unhealthy = false;

    match state.enqueuer().store() {
        Some(store) => match store.ping().await {
            Ok(()) => {
                health_status["checks"]["buffer_store"] =
                    json!({ "status": "healthy" });
            }
            Err(e) => {
                health_status["checks"]["buffer_store"] = json!({
                    "status": "unhealthy",
                    "error": e.to_string()
                });
                is_unhealthy = true;
            }
        },
        None => {
            health_status["checks"]["buffer_store"] = json!({
                "status": "unhealthy",
                "error": "not initialized"
            });
            is_unhealthy = true;
        }
    }

    let queue_check = match state.enqueuer().queue() {
        Some(queue) => match queue.ping().await {
            Ok(()) => queue.pending().await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        },
        None => Err("not initialized".to_string()),
    };

    match queue_check {
        Ok(pending) => {
            health_status["checks"]["flush_queue"] = json!({
                "status": "healthy",
                "pending": pending
            });
        }
        Err(error) => {
            health_status["checks"]["flush_queue"] = json!({
                "status": "unhealthy",
                "error": error
            });
            is_unhealthy = true;
        }
    }

    if is_unhealthy {
        health_status["status"] = json!("unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(health_status))
    } else {
        (StatusCode::OK, Json(health_status))
    }
}
