//! Batch ingestion: buffer every event and schedule one flush per window.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use spool_model::{BufferedEvent, IngestionEvent, ProjectId};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, error, warn};

use crate::buffer::BufferStore;
use crate::error::{IngestError, Result};
use crate::keys::{
    BatchTimestamp, FlushKey, derive_buffer_key, derive_event_category,
    derive_flush_key,
};
use crate::queue::{FlushQueue, ScheduleOutcome};

/// Default buffer lifetime; long enough to outlast flush-worker latency.
pub const DEFAULT_BUFFER_TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnqueueSettings {
    /// Expiry refreshed on every append.
    pub buffer_ttl: Duration,
}

impl Default for EnqueueSettings {
    fn default() -> Self {
        Self {
            buffer_ttl: DEFAULT_BUFFER_TTL,
        }
    }
}

/// What a successful batch call did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueSummary {
    pub batch_timestamp: i64,
    /// Events appended to a buffer.
    pub buffered: usize,
    /// Events dropped because their body named no entity.
    pub skipped: usize,
    /// Distinct flush keys touched by this call, sorted.
    pub flush_keys: Vec<FlushKey>,
}

enum EventOutcome {
    Buffered(FlushKey),
    Skipped,
}

/// Appends events to their entity buffers and requests deduplicated flushes.
///
/// Holds no mutable state: the store and the queue are the only
/// synchronization points between concurrent calls.
#[derive(Clone, Default)]
pub struct IngestionEnqueuer {
    store: Option<Arc<dyn BufferStore>>,
    queue: Option<Arc<dyn FlushQueue>>,
    settings: EnqueueSettings,
}

impl fmt::Debug for IngestionEnqueuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionEnqueuer")
            .field("store", &self.store.is_some())
            .field("queue", &self.queue.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl IngestionEnqueuer {
    pub fn new(settings: EnqueueSettings) -> Self {
        Self {
            store: None,
            queue: None,
            settings,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn BufferStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn FlushQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn settings(&self) -> &EnqueueSettings {
        &self.settings
    }

    pub fn store(&self) -> Option<&Arc<dyn BufferStore>> {
        self.store.as_ref()
    }

    pub fn queue(&self) -> Option<&Arc<dyn FlushQueue>> {
        self.queue.as_ref()
    }

    /// Enqueues `events` under a batch timestamp taken now.
    pub async fn enqueue_batch(
        &self,
        project_id: &ProjectId,
        events: Vec<IngestionEvent>,
    ) -> Result<EnqueueSummary> {
        self.enqueue_batch_at(project_id, events, BatchTimestamp::now())
            .await
    }

    /// Enqueues `events` under an explicit batch timestamp.
    ///
    /// Fails fast with [`IngestError::Unavailable`] before touching any event
    /// if the queue or store is missing. Otherwise every per-event pipeline
    /// runs to completion; if any failed, the first failure (in submission
    /// order) is returned and side effects of the others stay in place.
    pub async fn enqueue_batch_at(
        &self,
        project_id: &ProjectId,
        events: Vec<IngestionEvent>,
        batch_timestamp: BatchTimestamp,
    ) -> Result<EnqueueSummary> {
        let queue = self.queue.as_deref().ok_or_else(|| {
            IngestError::Unavailable("flush queue not initialized".into())
        })?;
        let store = self.store.as_deref().ok_or_else(|| {
            IngestError::Unavailable("buffer store not initialized".into())
        })?;

        let total = events.len();
        let pipelines = events.into_iter().map(|event| {
            self.enqueue_single(store, queue, project_id, event, batch_timestamp)
        });
        let outcomes = join_all(pipelines).await;

        let mut summary = EnqueueSummary {
            batch_timestamp: batch_timestamp.as_millis(),
            ..EnqueueSummary::default()
        };
        let mut first_error = None;
        let mut failed = 0usize;

        for outcome in outcomes {
            match outcome {
                Ok(EventOutcome::Buffered(flush_key)) => {
                    summary.buffered += 1;
                    summary.flush_keys.push(flush_key);
                }
                Ok(EventOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            error!(
                project_id = %project_id,
                batch_timestamp = %batch_timestamp,
                total,
                failed,
                buffered = summary.buffered,
                "ingestion batch failed: {err}"
            );
            return Err(err);
        }

        summary.flush_keys.sort();
        summary.flush_keys.dedup();

        debug!(
            project_id = %project_id,
            batch_timestamp = %batch_timestamp,
            buffered = summary.buffered,
            skipped = summary.skipped,
            flushes = summary.flush_keys.len(),
            "ingestion batch buffered"
        );

        Ok(summary)
    }

    // The append must be the first await: futures are first-polled in
    // submission order, which keeps per-buffer append order.
    async fn enqueue_single(
        &self,
        store: &dyn BufferStore,
        queue: &dyn FlushQueue,
        project_id: &ProjectId,
        event: IngestionEvent,
        batch_timestamp: BatchTimestamp,
    ) -> Result<EventOutcome> {
        let Some(entity_id) = event.entity_id() else {
            warn!(
                project_id = %project_id,
                event_id = %event.id,
                event_type = %event.event_type,
                "Received ingestion event without id: {}",
                serde_json::to_string(&event).unwrap_or_default()
            );
            return Ok(EventOutcome::Skipped);
        };

        let category = derive_event_category(&event);
        let flush_key =
            derive_flush_key(project_id, &entity_id, &category, batch_timestamp);
        let buffer_key = derive_buffer_key(&flush_key);
        let payload = serde_json::to_string(&BufferedEvent::new(
            project_id.clone(),
            event,
        ))?;

        store.append(&buffer_key, payload).await?;
        store.set_expiry(&buffer_key, self.settings.buffer_ttl).await?;

        match queue.schedule_flush(&flush_key).await? {
            ScheduleOutcome::Scheduled => {
                debug!(flush_key = %flush_key, "flush scheduled")
            }
            ScheduleOutcome::AlreadyPending => {}
        }

        Ok(EventOutcome::Buffered(flush_key))
    }
}
