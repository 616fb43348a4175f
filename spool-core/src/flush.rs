//! Hand-off from a scheduled flush job to the code that processes a buffer.
//!
//! The worker is handed nothing but a [`FlushKey`]. From it, it derives the
//! buffer key, reads the buffer in append order and passes the decoded
//! payloads to a [`FlushHandler`]. Only after the handler succeeds are those
//! payloads trimmed from the buffer and the job completed; a failed handler
//! leaves the buffer intact for the retry. Handlers must tolerate empty
//! batches (the buffer expired or was already flushed) and duplicate
//! payloads (callers retry whole batches, and a stalled job can be handed
//! out again).

use async_trait::async_trait;
use spool_model::BufferedEvent;
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, warn};

use crate::buffer::BufferStore;
use crate::error::Result;
use crate::keys::{BufferKey, FlushKey, FlushKeyParts, derive_buffer_key};
use crate::queue::{FlushJob, FlushQueue};

/// Drained contents of one buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushBatch {
    pub flush_key: FlushKey,
    pub parts: FlushKeyParts,
    pub attempts: u32,
    pub events: Vec<BufferedEvent>,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Downstream processing for a flushed buffer.
#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn handle(&self, batch: FlushBatch) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No job was waiting.
    Idle,
    Flushed { flush_key: FlushKey, events: usize },
    /// The handler failed; the job went back to pending with its buffer
    /// untouched.
    Released { flush_key: FlushKey, error: String },
}

/// Claims flush jobs and hands their buffers to a handler.
#[derive(Clone)]
pub struct FlushWorker {
    store: Arc<dyn BufferStore>,
    queue: Arc<dyn FlushQueue>,
}

impl fmt::Debug for FlushWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushWorker").finish_non_exhaustive()
    }
}

impl FlushWorker {
    pub fn new(store: Arc<dyn BufferStore>, queue: Arc<dyn FlushQueue>) -> Self {
        Self { store, queue }
    }

    /// Decoded contents of the buffer behind `flush_key`, left in place.
    ///
    /// Payloads that no longer decode are logged and dropped.
    pub async fn read(&self, flush_key: &FlushKey) -> Result<Vec<BufferedEvent>> {
        let buffer_key = derive_buffer_key(flush_key);
        let (_, events) = self.read_buffer(&buffer_key).await?;
        Ok(events)
    }

    /// The count is of raw payloads, undecodable ones included.
    async fn read_buffer(
        &self,
        buffer_key: &BufferKey,
    ) -> Result<(usize, Vec<BufferedEvent>)> {
        let raw = self.store.read(buffer_key).await?;
        let count = raw.len();

        let mut events = Vec::with_capacity(count);
        for payload in raw {
            match serde_json::from_str::<BufferedEvent>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    buffer_key = %buffer_key,
                    "dropping undecodable buffered payload: {e}"
                ),
            }
        }
        Ok((count, events))
    }

    /// Claims at most one job and hands its buffer to `handler`.
    pub async fn run_once<H>(&self, handler: &H) -> Result<FlushOutcome>
    where
        H: FlushHandler + ?Sized,
    {
        let Some(job) = self.queue.claim().await? else {
            return Ok(FlushOutcome::Idle);
        };
        let FlushJob {
            flush_key,
            attempts,
            ..
        } = job;

        let parts = match flush_key.parts() {
            Ok(parts) => parts,
            Err(err) => {
                // Nothing can ever flush this key; drop the job.
                error!(flush_key = %flush_key, "discarding flush job: {err}");
                self.queue.complete(&flush_key).await?;
                return Err(err);
            }
        };

        let buffer_key = derive_buffer_key(&flush_key);
        let (read, events) = self.read_buffer(&buffer_key).await?;
        let count = events.len();
        if events.is_empty() {
            debug!(flush_key = %flush_key, "flushing empty buffer");
        }

        let batch = FlushBatch {
            flush_key: flush_key.clone(),
            parts,
            attempts,
            events,
        };

        match handler.handle(batch).await {
            Ok(()) => {
                self.store.trim_front(&buffer_key, read).await?;
                self.queue.complete(&flush_key).await?;
                info!(flush_key = %flush_key, events = count, "buffer flushed");
                Ok(FlushOutcome::Flushed {
                    flush_key,
                    events: count,
                })
            }
            Err(err) => {
                warn!(
                    flush_key = %flush_key,
                    attempts,
                    "flush handler failed, releasing job: {err}"
                );
                self.queue.release(&flush_key).await?;
                Ok(FlushOutcome::Released {
                    flush_key,
                    error: err.to_string(),
                })
            }
        }
    }

    /// Runs jobs until the queue reports nothing pending or a handler
    /// fails. Returns how many buffers were flushed.
    pub async fn run_until_idle<H>(&self, handler: &H) -> Result<usize>
    where
        H: FlushHandler + ?Sized,
    {
        let mut flushed = 0;
        loop {
            match self.run_once(handler).await? {
                FlushOutcome::Idle | FlushOutcome::Released { .. } => {
                    return Ok(flushed);
                }
                FlushOutcome::Flushed { .. } => flushed += 1,
            }
        }
    }
}
