use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use spool_core::{
    EnqueueSettings, FlushJob, FlushKey, FlushQueue, InMemoryBufferStore,
    InMemoryFlushQueue, IngestError, IngestionEnqueuer, ScheduleOutcome,
};
use spool_server::{AppState, Backend, create_app};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<InMemoryBufferStore>,
    queue: Arc<InMemoryFlushQueue>,
}

fn create_test_app() -> TestApp {
    let store = Arc::new(InMemoryBufferStore::new());
    let queue = Arc::new(InMemoryFlushQueue::new());
    let enqueuer = IngestionEnqueuer::new(EnqueueSettings::default())
        .with_store(store.clone())
        .with_queue(queue.clone());
    TestApp {
        router: create_app(AppState::new(enqueuer, Backend::Memory)),
        store,
        queue,
    }
}

fn create_unavailable_app() -> Router {
    let enqueuer = IngestionEnqueuer::new(EnqueueSettings::default())
        .with_store(Arc::new(InMemoryBufferStore::new()));
    create_app(AppState::new(enqueuer, Backend::Unavailable))
}

fn ingestion_request(project: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/projects/{project}/ingestion"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn event(kind: &str, body: Value) -> Value {
    json!({
        "id": format!("evt-{kind}"),
        "timestamp": "2024-05-01T10:00:00.000Z",
        "type": kind,
        "body": body,
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_batch_is_accepted_with_summary() {
    let app = create_test_app();
    let request = ingestion_request(
        "proj-1",
        json!({
            "batch": [
                event("trace-create", json!({ "id": "trace-a" })),
                event("trace-create", json!({ "id": "trace-a", "name": "retry" })),
                event("span-update", json!({ "id": "span-b" })),
                event("sdk-log", json!({ "log": "no entity" })),
            ]
        }),
    );

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = json_body(response).await;
    assert_eq!(json["buffered"], 3);
    assert_eq!(json["skipped"], 1);
    assert_eq!(json["flush_keys"].as_array().unwrap().len(), 2);
    assert!(json["request_id"].is_string());

    assert_eq!(app.store.keys().await.len(), 2);
    assert_eq!(app.queue.pending().await.unwrap(), 2);
}

#[tokio::test]
async fn test_missing_dependency_returns_503() {
    let app = create_unavailable_app();
    let request = ingestion_request(
        "proj-1",
        json!({ "batch": [event("trace-create", json!({ "id": "t" }))] }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = json_body(response).await;
    assert_eq!(json["error"]["status"], 503);
}

#[tokio::test]
async fn test_malformed_body_returns_400() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(ingestion_request("proj-1", json!({ "events": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/projects/proj-1/ingestion")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(app.store.keys().await.is_empty());
}

#[tokio::test]
async fn test_empty_batch_is_accepted() {
    let app = create_test_app();
    let response = app
        .router
        .oneshot(ingestion_request("proj-1", json!({ "batch": [] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["buffered"], 0);
}

#[tokio::test]
async fn test_health_reports_collaborators() {
    let app = create_test_app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["backend"], "memory");
    assert_eq!(json["checks"]["flush_queue"]["pending"], 0);
}

#[tokio::test]
async fn test_health_is_unavailable_without_queue() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = create_unavailable_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = json_body(response).await;
    assert_eq!(json["checks"]["flush_queue"]["status"], "unhealthy");
    assert_eq!(json["checks"]["buffer_store"]["status"], "healthy");
}

/// Queue that still answers bookkeeping calls but fails its liveness check.
#[derive(Debug, Default)]
struct UnreachableQueue {
    inner: InMemoryFlushQueue,
}

#[async_trait]
impl FlushQueue for UnreachableQueue {
    async fn schedule_flush(
        &self,
        flush_key: &FlushKey,
    ) -> spool_core::Result<ScheduleOutcome> {
        self.inner.schedule_flush(flush_key).await
    }

    async fn claim(&self) -> spool_core::Result<Option<FlushJob>> {
        self.inner.claim().await
    }

    async fn complete(&self, flush_key: &FlushKey) -> spool_core::Result<()> {
        self.inner.complete(flush_key).await
    }

    async fn release(&self, flush_key: &FlushKey) -> spool_core::Result<()> {
        self.inner.release(flush_key).await
    }

    async fn pending(&self) -> spool_core::Result<usize> {
        self.inner.pending().await
    }

    async fn ping(&self) -> spool_core::Result<()> {
        Err(IngestError::Unavailable("queue PING timed out".into()))
    }
}

#[tokio::test]
async fn test_health_pings_the_flush_queue() {
    let enqueuer = IngestionEnqueuer::new(EnqueueSettings::default())
        .with_store(Arc::new(InMemoryBufferStore::new()))
        .with_queue(Arc::new(UnreachableQueue::default()));
    let app = create_app(AppState::new(enqueuer, Backend::Redis));
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = json_body(response).await;
    assert_eq!(json["checks"]["flush_queue"]["status"], "unhealthy");
    assert!(
        json["checks"]["flush_queue"]["error"]
            .as_str()
            .unwrap()
            .contains("PING")
    );
}
