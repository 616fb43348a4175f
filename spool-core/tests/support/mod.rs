#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use spool_core::{
    BufferStore, FlushJob, FlushKey, FlushQueue, InMemoryBufferStore,
    InMemoryFlushQueue, IngestError, Result, ScheduleOutcome,
    derive_buffer_key,
};
use spool_model::IngestionEvent;
use tokio::sync::Mutex;

pub fn event(kind: &str, entity: Option<&str>) -> IngestionEvent {
    let body = match entity {
        Some(id) => json!({ "id": id, "name": format!("{kind} {id}") }),
        None => json!({ "name": "anonymous" }),
    };
    event_with_body(kind, body)
}

pub fn event_with_body(kind: &str, body: Value) -> IngestionEvent {
    serde_json::from_value(json!({
        "id": format!("evt-{}", next_event_seq()),
        "timestamp": "2024-05-01T10:00:00.000Z",
        "type": kind,
        "body": body,
    }))
    .expect("valid ingestion event")
}

fn next_event_seq() -> usize {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Queue whose first `failures` schedule calls error out.
#[derive(Debug, Default)]
pub struct FailingQueue {
    pub inner: InMemoryFlushQueue,
    failures_left: AtomicUsize,
}

impl FailingQueue {
    pub fn failing(failures: usize) -> Self {
        Self {
            inner: InMemoryFlushQueue::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl FlushQueue for FailingQueue {
    async fn schedule_flush(
        &self,
        flush_key: &FlushKey,
    ) -> Result<ScheduleOutcome> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(IngestError::Queue("queue connection reset".into()));
        }
        self.inner.schedule_flush(flush_key).await
    }

    async fn claim(&self) -> Result<Option<FlushJob>> {
        self.inner.claim().await
    }

    async fn complete(&self, flush_key: &FlushKey) -> Result<()> {
        self.inner.complete(flush_key).await
    }

    async fn release(&self, flush_key: &FlushKey) -> Result<()> {
        self.inner.release(flush_key).await
    }

    async fn pending(&self) -> Result<usize> {
        self.inner.pending().await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

/// Queue that records how many payloads each buffer held at the moment its
/// flush was requested.
#[derive(Debug)]
pub struct BufferObservingQueue {
    pub store: Arc<InMemoryBufferStore>,
    pub inner: InMemoryFlushQueue,
    pub observed: Mutex<Vec<(FlushKey, usize)>>,
}

impl BufferObservingQueue {
    pub fn new(store: Arc<InMemoryBufferStore>) -> Self {
        Self {
            store,
            inner: InMemoryFlushQueue::new(),
            observed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FlushQueue for BufferObservingQueue {
    async fn schedule_flush(
        &self,
        flush_key: &FlushKey,
    ) -> Result<ScheduleOutcome> {
        let buffered = self.store.len(&derive_buffer_key(flush_key)).await?;
        self.observed.lock().await.push((flush_key.clone(), buffered));
        self.inner.schedule_flush(flush_key).await
    }

    async fn claim(&self) -> Result<Option<FlushJob>> {
        self.inner.claim().await
    }

    async fn complete(&self, flush_key: &FlushKey) -> Result<()> {
        self.inner.complete(flush_key).await
    }

    async fn release(&self, flush_key: &FlushKey) -> Result<()> {
        self.inner.release(flush_key).await
    }

    async fn pending(&self) -> Result<usize> {
        self.inner.pending().await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
