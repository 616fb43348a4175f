//! # Spool Core
//!
//! Buffers ingestion events per entity and schedules exactly one deferred
//! flush job per entity and batch window.
//!
//! ## Overview
//!
//! - [`keys`]: pure derivation of flush keys and buffer keys
//! - [`enqueue`]: the batch enqueuer (append, refresh TTL, schedule)
//! - [`buffer`]: the [`BufferStore`] collaborator and its Redis/in-memory
//!   implementations
//! - [`queue`]: the [`FlushQueue`] collaborator with per-key dedupe
//! - [`flush`]: the hand-off a flush worker uses to drain a buffer
//!
//! ## Feature Flags
//!
//! - `redis` (default): Redis-backed store and queue
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use spool_core::{
//!     EnqueueSettings, InMemoryBufferStore, InMemoryFlushQueue,
//!     IngestionEnqueuer,
//! };
//! use spool_model::{IngestionEvent, ProjectId};
//!
//! async fn ingest(
//!     events: Vec<IngestionEvent>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let enqueuer = IngestionEnqueuer::new(EnqueueSettings::default())
//!         .with_store(Arc::new(InMemoryBufferStore::new()))
//!         .with_queue(Arc::new(InMemoryFlushQueue::new()));
//!
//!     let summary = enqueuer
//!         .enqueue_batch(&ProjectId::new("project-1"), events)
//!         .await?;
//!     println!("{} flushes scheduled", summary.flush_keys.len());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod buffer;
pub mod enqueue;
pub mod error;
pub mod flush;
pub mod keys;
pub mod queue;

pub use buffer::{BufferStore, InMemoryBufferStore};
#[cfg(feature = "redis")]
pub use buffer::RedisBufferStore;
pub use enqueue::{
    DEFAULT_BUFFER_TTL, EnqueueSettings, EnqueueSummary, IngestionEnqueuer,
};
pub use error::{IngestError, Result};
pub use flush::{FlushBatch, FlushHandler, FlushOutcome, FlushWorker};
pub use keys::{
    BatchTimestamp, BufferKey, FlushKey, FlushKeyParts, derive_buffer_key,
    derive_event_category, derive_flush_key,
};
pub use queue::{
    DEFAULT_QUEUE_PREFIX, DEFAULT_VISIBILITY_TIMEOUT, FlushJob, FlushQueue,
    InMemoryFlushQueue, JobState, QueueSettings, ScheduleOutcome,
};
#[cfg(feature = "redis")]
pub use queue::RedisFlushQueue;
