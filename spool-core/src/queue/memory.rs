use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use super::{FlushJob, FlushQueue, JobState, QueueSettings, ScheduleOutcome};
use crate::error::Result;
use crate::keys::FlushKey;

/// Process-local flush queue. Dedupe is a map lookup under one lock.
///
/// Timeouts run on [`tokio::time::Instant`], so tests can drive stalled-job
/// reclaim and job expiry with a paused clock.
#[derive(Default)]
pub struct InMemoryFlushQueue {
    settings: QueueSettings,
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<FlushKey, JobEntry>,
    ready: VecDeque<FlushKey>,
    schedule_requests: u64,
}

#[derive(Debug, Clone)]
struct JobEntry {
    state: JobState,
    attempts: u32,
    scheduled_at: DateTime<Utc>,
    claimed_at: Option<Instant>,
    expires_at: Instant,
    rescheduled: bool,
}

impl JobEntry {
    fn fresh(now: Instant, settings: &QueueSettings) -> Self {
        Self {
            state: JobState::Pending,
            attempts: 0,
            scheduled_at: Utc::now(),
            claimed_at: None,
            expires_at: now + settings.job_ttl,
            rescheduled: false,
        }
    }
}

/// Point-in-time view of a job, for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSnapshot {
    pub flush_key: FlushKey,
    pub state: JobState,
    pub attempts: u32,
}

impl fmt::Debug for InMemoryFlushQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryFlushQueue");
        debug.field("settings", &self.settings);
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("jobs", &state.jobs.len())
                    .field("ready", &state.ready.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl InMemoryFlushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        Self {
            settings,
            state: Mutex::default(),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Every job currently known to the queue, sorted by key.
    pub async fn jobs(&self) -> Vec<JobSnapshot> {
        let mut state = self.state.lock().await;
        self.sweep(&mut state, Instant::now());
        let mut jobs: Vec<JobSnapshot> = state
            .jobs
            .iter()
            .map(|(key, entry)| JobSnapshot {
                flush_key: key.clone(),
                state: entry.state,
                attempts: entry.attempts,
            })
            .collect();
        jobs.sort_by(|a, b| a.flush_key.cmp(&b.flush_key));
        jobs
    }

    pub async fn job(&self, flush_key: &FlushKey) -> Option<JobSnapshot> {
        let mut state = self.state.lock().await;
        self.sweep(&mut state, Instant::now());
        state.jobs.get(flush_key).map(|entry| JobSnapshot {
            flush_key: flush_key.clone(),
            state: entry.state,
            attempts: entry.attempts,
        })
    }

    /// Total schedule calls received, including deduplicated ones.
    pub async fn schedule_requests(&self) -> u64 {
        self.state.lock().await.schedule_requests
    }

    /// Drops expired jobs and returns stalled active jobs to pending.
    fn sweep(&self, state: &mut QueueState, now: Instant) {
        let QueueState { jobs, ready, .. } = &mut *state;
        let before = jobs.len();
        jobs.retain(|key, entry| {
            let live = entry.expires_at > now;
            if !live {
                debug!(flush_key = %key, "flush job expired");
            }
            live
        });
        if jobs.len() != before {
            ready.retain(|key| jobs.contains_key(key));
        }

        let mut reclaimed = Vec::new();
        for (key, entry) in state.jobs.iter_mut() {
            let stalled = entry.state == JobState::Active
                && entry.claimed_at.is_some_and(|at| {
                    at + self.settings.visibility_timeout <= now
                });
            if stalled {
                warn!(
                    flush_key = %key,
                    attempts = entry.attempts,
                    "reclaiming stalled flush job"
                );
                entry.state = JobState::Pending;
                entry.claimed_at = None;
                entry.rescheduled = false;
                entry.expires_at = now + self.settings.job_ttl;
                reclaimed.push(key.clone());
            }
        }
        reclaimed.sort();
        state.ready.extend(reclaimed);
    }
}

#[async_trait]
impl FlushQueue for InMemoryFlushQueue {
    async fn schedule_flush(
        &self,
        flush_key: &FlushKey,
    ) -> Result<ScheduleOutcome> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        self.sweep(&mut state, now);
        state.schedule_requests += 1;

        if let Some(entry) = state.jobs.get_mut(flush_key) {
            if entry.state == JobState::Active {
                entry.rescheduled = true;
            }
            entry.expires_at = now + self.settings.job_ttl;
            debug!(flush_key = %flush_key, "flush already scheduled");
            return Ok(ScheduleOutcome::AlreadyPending);
        }

        state
            .jobs
            .insert(flush_key.clone(), JobEntry::fresh(now, &self.settings));
        state.ready.push_back(flush_key.clone());
        Ok(ScheduleOutcome::Scheduled)
    }

    async fn claim(&self) -> Result<Option<FlushJob>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        self.sweep(&mut state, now);

        while let Some(key) = state.ready.pop_front() {
            let Some(entry) = state.jobs.get_mut(&key) else {
                continue;
            };
            if entry.state != JobState::Pending {
                continue;
            }
            entry.state = JobState::Active;
            entry.attempts += 1;
            entry.claimed_at = Some(now);
            entry.expires_at = now + self.settings.job_ttl;
            return Ok(Some(FlushJob {
                flush_key: key,
                attempts: entry.attempts,
                scheduled_at: entry.scheduled_at,
            }));
        }
        Ok(None)
    }

    async fn complete(&self, flush_key: &FlushKey) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.ready.retain(|key| key != flush_key);

        let rescheduled = state
            .jobs
            .get(flush_key)
            .is_some_and(|entry| entry.rescheduled);
        if rescheduled {
            debug!(flush_key = %flush_key, "flush job rescheduled on completion");
            state
                .jobs
                .insert(flush_key.clone(), JobEntry::fresh(now, &self.settings));
            state.ready.push_back(flush_key.clone());
        } else {
            state.jobs.remove(flush_key);
        }
        Ok(())
    }

    async fn release(&self, flush_key: &FlushKey) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let released = match state.jobs.get_mut(flush_key) {
            Some(entry) if entry.state == JobState::Active => {
                entry.state = JobState::Pending;
                entry.claimed_at = None;
                entry.rescheduled = false;
                entry.expires_at = now + self.settings.job_ttl;
                true
            }
            _ => false,
        };
        if released {
            state.ready.push_back(flush_key.clone());
        }
        Ok(())
    }

    async fn pending(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.sweep(&mut state, Instant::now());
        Ok(state
            .jobs
            .values()
            .filter(|entry| entry.state == JobState::Pending)
            .count())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
