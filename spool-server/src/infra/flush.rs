use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use spool_core::{FlushBatch, FlushHandler, FlushWorker};
use tracing::info;

use crate::infra::startup::Collaborators;

/// Handler that reports each drained window and discards it.
#[derive(Debug, Default)]
pub struct LoggingFlushHandler;

#[async_trait]
impl FlushHandler for LoggingFlushHandler {
    async fn handle(&self, batch: FlushBatch) -> spool_core::Result<()> {
        info!(
            flush_key = %batch.flush_key,
            project_id = %batch.parts.project_id,
            entity_id = %batch.parts.entity_id,
            category = %batch.parts.category,
            batch_timestamp = %batch.parts.batch_timestamp,
            attempts = batch.attempts,
            events = batch.events.len(),
            "drained ingestion buffer"
        );
        Ok(())
    }
}

pub fn worker(collaborators: &Collaborators) -> Result<FlushWorker> {
    let store = collaborators
        .store
        .clone()
        .ok_or_else(|| anyhow!("buffer store is unavailable"))?;
    let queue = collaborators
        .queue
        .clone()
        .ok_or_else(|| anyhow!("flush queue is unavailable"))?;
    Ok(FlushWorker::new(store, queue))
}

/// Drains pending windows. With `poll` set, keeps polling until ctrl-c.
pub async fn run_flush_worker<H>(
    worker: &FlushWorker,
    handler: &H,
    poll: Option<Duration>,
) -> Result<usize>
where
    H: FlushHandler,
{
    let mut total = worker
        .run_until_idle(handler)
        .await
        .context("flush worker failed")?;

    let Some(interval) = poll else {
        info!(flushed = total, "flush queue drained");
        return Ok(total);
    };

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                total += worker
                    .run_until_idle(handler)
                    .await
                    .context("flush worker failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(flushed = total, "flush worker stopping");
                return Ok(total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::EnqueueSettings;
    use spool_model::{IngestionEvent, ProjectId};

    fn event(entity: &str) -> IngestionEvent {
        serde_json::from_value(serde_json::json!({
            "id": format!("evt-{entity}"),
            "timestamp": "2024-05-01T10:00:00.000Z",
            "type": "trace-create",
            "body": { "id": entity },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn drains_everything_scheduled_through_the_enqueuer() {
        let collaborators = Collaborators::in_memory();
        let enqueuer = spool_core::IngestionEnqueuer::new(
            EnqueueSettings::default(),
        )
        .with_store(collaborators.store.clone().unwrap())
        .with_queue(collaborators.queue.clone().unwrap());

        enqueuer
            .enqueue_batch(
                &ProjectId::new("proj-1"),
                vec![event("a"), event("b"), event("a")],
            )
            .await
            .unwrap();

        let worker = worker(&collaborators).unwrap();
        let flushed = run_flush_worker(&worker, &LoggingFlushHandler, None)
            .await
            .unwrap();

        assert_eq!(flushed, 2);
        let queue = collaborators.queue.as_ref().unwrap();
        assert_eq!(queue.pending().await.unwrap(), 0);
    }

    #[test]
    fn worker_requires_both_collaborators() {
        let collaborators = Collaborators {
            store: None,
            ..Collaborators::in_memory()
        };
        assert!(worker(&collaborators).is_err());
    }
}
