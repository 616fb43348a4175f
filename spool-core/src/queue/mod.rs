//! Flush job scheduling with per-key deduplication.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::enqueue::DEFAULT_BUFFER_TTL;
use crate::error::Result;
use crate::keys::FlushKey;

/// Namespace for queue-owned keys when none is configured.
pub const DEFAULT_QUEUE_PREFIX: &str = "ingestion-flush";

/// How long a claimed job may stay active before it is handed out again.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Timing knobs shared by every [`FlushQueue`] implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueSettings {
    /// An active job older than this is treated as stalled and returned to
    /// pending by the next claim.
    pub visibility_timeout: Duration,
    /// Lifetime of a job's bookkeeping, refreshed on every transition.
    /// Jobs nobody touches for this long disappear.
    pub job_ttl: Duration,
}

impl QueueSettings {
    /// Keeps job bookkeeping alive at least as long as the buffers it
    /// points at, plus one visibility window.
    pub fn for_buffer_ttl(
        buffer_ttl: Duration,
        visibility_timeout: Duration,
    ) -> Self {
        Self {
            visibility_timeout,
            job_ttl: buffer_ttl + visibility_timeout,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::for_buffer_ttl(DEFAULT_BUFFER_TTL, DEFAULT_VISIBILITY_TIMEOUT)
    }
}

pub use memory::InMemoryFlushQueue;
#[cfg(feature = "redis")]
pub use self::redis::RedisFlushQueue;

/// Scheduler-visible job states. A job exists in exactly one of these until
/// the flush worker completes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Active,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a schedule request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    Scheduled,
    /// A job with this id is already pending or active; nothing changed.
    AlreadyPending,
}

/// A claimed flush job. Carries no payload: the worker derives the buffer
/// from the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushJob {
    pub flush_key: FlushKey,
    pub attempts: u32,
    pub scheduled_at: DateTime<Utc>,
}

/// Abstracts the job queue that defers flushes.
///
/// Implementations must guarantee at most one pending or active job per
/// flush key. Scheduling a key that already has a job is a no-op: it is not
/// an error, it creates no duplicate and it leaves the job's attempt count
/// alone. Queues without native per-id dedupe must emulate it with an
/// atomic check-and-set before pushing.
///
/// A schedule request that arrives while the job is active is remembered:
/// completing that job turns it back into a fresh pending job, so payloads
/// appended during a flush still get one. Active jobs that outlive the
/// visibility timeout are reclaimed by the next [`claim`](Self::claim).
#[async_trait]
pub trait FlushQueue: Send + Sync {
    async fn schedule_flush(&self, flush_key: &FlushKey)
    -> Result<ScheduleOutcome>;

    /// Returns stalled active jobs to pending, then moves the oldest pending
    /// job to active and bumps its attempt count.
    async fn claim(&self) -> Result<Option<FlushJob>>;

    /// Removes the job, or requeues it as a fresh job if it was scheduled
    /// again while active.
    async fn complete(&self, flush_key: &FlushKey) -> Result<()>;

    /// Returns an active job to the back of the pending line.
    async fn release(&self, flush_key: &FlushKey) -> Result<()>;

    /// Number of jobs in the pending state.
    async fn pending(&self) -> Result<usize>;

    async fn ping(&self) -> Result<()>;
}
