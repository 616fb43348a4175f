use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::{fmt, time::Duration};
use tracing::{debug, info, warn};

use super::{FlushJob, FlushQueue, QueueSettings, ScheduleOutcome};
use crate::error::{IngestError, Result};
use crate::keys::FlushKey;

/// Redis scripts for atomic queue transitions
mod scripts {
    use redis::Script;

    /// KEYS: job hash, ready list. ARGV: flush key, scheduled_at, job ttl ms.
    /// The job hash doubles as the dedupe marker. A hit on an active job
    /// only flags it for rescheduling.
    pub fn schedule() -> Script {
        Script::new(
            r#"
            local state = redis.call('HGET', KEYS[1], 'state')
            if state then
                if state == 'active' then
                    redis.call('HSET', KEYS[1], 'rescheduled', 1)
                end
                redis.call('PEXPIRE', KEYS[1], ARGV[3])
                return 0
            end
            redis.call('HSET', KEYS[1],
                'state', 'pending',
                'attempts', 0,
                'scheduled_at', ARGV[2],
                'rescheduled', 0)
            redis.call('PEXPIRE', KEYS[1], ARGV[3])
            redis.call('RPUSH', KEYS[2], ARGV[1])
            return 1
            "#,
        )
    }

    /// KEYS: ready list, active zset.
    /// ARGV: job hash prefix, now ms, visibility timeout ms, job ttl ms.
    /// Active entries are scored by their visibility deadline. Ids whose
    /// job expired while they sat in the list are skipped.
    pub fn claim() -> Script {
        Script::new(
            r#"
            local stalled = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[2])
            for _, id in ipairs(stalled) do
                redis.call('ZREM', KEYS[2], id)
                local job = ARGV[1] .. id
                if redis.call('HGET', job, 'state') == 'active' then
                    redis.call('HSET', job, 'state', 'pending', 'rescheduled', 0)
                    redis.call('HDEL', job, 'claimed_at')
                    redis.call('PEXPIRE', job, ARGV[4])
                    redis.call('RPUSH', KEYS[1], id)
                end
            end

            while true do
                local id = redis.call('LPOP', KEYS[1])
                if not id then
                    return false
                end
                local job = ARGV[1] .. id
                if redis.call('HGET', job, 'state') == 'pending' then
                    redis.call('HSET', job, 'state', 'active', 'claimed_at', ARGV[2])
                    local attempts = redis.call('HINCRBY', job, 'attempts', 1)
                    local deadline = tonumber(ARGV[2]) + tonumber(ARGV[3])
                    redis.call('ZADD', KEYS[2], deadline, id)
                    redis.call('PEXPIRE', job, ARGV[4])
                    local scheduled_at = redis.call('HGET', job, 'scheduled_at')
                    return {id, attempts, scheduled_at}
                end
            end
            "#,
        )
    }

    /// KEYS: job hash, ready list, active zset.
    /// ARGV: flush key, scheduled_at, job ttl ms.
    pub fn complete() -> Script {
        Script::new(
            r#"
            redis.call('ZREM', KEYS[3], ARGV[1])
            redis.call('LREM', KEYS[2], 0, ARGV[1])
            if redis.call('HGET', KEYS[1], 'rescheduled') == '1' then
                redis.call('HSET', KEYS[1],
                    'state', 'pending',
                    'attempts', 0,
                    'scheduled_at', ARGV[2],
                    'rescheduled', 0)
                redis.call('HDEL', KEYS[1], 'claimed_at')
                redis.call('PEXPIRE', KEYS[1], ARGV[3])
                redis.call('RPUSH', KEYS[2], ARGV[1])
                return 1
            end
            redis.call('DEL', KEYS[1])
            return 0
            "#,
        )
    }

    /// KEYS: job hash, ready list, active zset. ARGV: flush key, job ttl ms.
    pub fn release() -> Script {
        Script::new(
            r#"
            redis.call('ZREM', KEYS[3], ARGV[1])
            if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
                return 0
            end
            redis.call('HSET', KEYS[1], 'state', 'pending', 'rescheduled', 0)
            redis.call('HDEL', KEYS[1], 'claimed_at')
            redis.call('PEXPIRE', KEYS[1], ARGV[2])
            redis.call('RPUSH', KEYS[2], ARGV[1])
            return 1
            "#,
        )
    }

    /// KEYS: ready list. ARGV: job hash prefix.
    /// Counts distinct ids whose job is still pending.
    pub fn pending() -> Script {
        Script::new(
            r#"
            local count = 0
            local seen = {}
            for _, id in ipairs(redis.call('LRANGE', KEYS[1], 0, -1)) do
                if not seen[id]
                    and redis.call('HGET', ARGV[1] .. id, 'state') == 'pending'
                then
                    count = count + 1
                end
                seen[id] = true
            end
            return count
            "#,
        )
    }
}

/// Flush queue backed by a Redis list of ready ids, a sorted set of active
/// ids keyed by visibility deadline, and one expiring hash per job.
#[derive(Clone)]
pub struct RedisFlushQueue {
    conn: ConnectionManager,
    prefix: String,
    settings: QueueSettings,
}

impl fmt::Debug for RedisFlushQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisFlushQueue")
            .field("connection", &"ConnectionManager")
            .field("prefix", &self.prefix)
            .field("settings", &self.settings)
            .finish()
    }
}

impl RedisFlushQueue {
    pub async fn connect(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self> {
        info!("Connecting flush queue to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| {
            IngestError::Unavailable(format!(
                "Failed to create Redis client: {e}"
            ))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            IngestError::Unavailable(format!("Failed to connect to Redis: {e}"))
        })?;

        Ok(Self::from_connection(conn, prefix))
    }

    pub fn from_connection(
        conn: ConnectionManager,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            settings: QueueSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: QueueSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    fn job_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job_key(&self, flush_key: &FlushKey) -> String {
        format!("{}{}", self.job_prefix(), flush_key)
    }

    fn ready_key(&self) -> String {
        format!("{}:ready", self.prefix)
    }

    fn active_key(&self) -> String {
        format!("{}:active", self.prefix)
    }

    fn job_ttl_ms(&self) -> u64 {
        millis(self.settings.job_ttl).max(1)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl FlushQueue for RedisFlushQueue {
    async fn schedule_flush(
        &self,
        flush_key: &FlushKey,
    ) -> Result<ScheduleOutcome> {
        let mut conn = self.conn.clone();
        let script = scripts::schedule();
        let created = script
            .key(self.job_key(flush_key))
            .key(self.ready_key())
            .arg(flush_key.as_str())
            .arg(Utc::now().to_rfc3339())
            .arg(self.job_ttl_ms())
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| {
                IngestError::Queue(format!("flush schedule failed: {e}"))
            })?;

        if created == 1 {
            debug!(flush_key = %flush_key, "flush job scheduled");
            Ok(ScheduleOutcome::Scheduled)
        } else {
            debug!(flush_key = %flush_key, "flush already scheduled");
            Ok(ScheduleOutcome::AlreadyPending)
        }
    }

    async fn claim(&self) -> Result<Option<FlushJob>> {
        let mut conn = self.conn.clone();
        let script = scripts::claim();
        let claimed = script
            .key(self.ready_key())
            .key(self.active_key())
            .arg(self.job_prefix())
            .arg(Utc::now().timestamp_millis())
            .arg(millis(self.settings.visibility_timeout))
            .arg(self.job_ttl_ms())
            .invoke_async::<Option<(String, i64, String)>>(&mut conn)
            .await
            .map_err(|e| IngestError::Queue(format!("flush claim failed: {e}")))?;

        let Some((raw_key, attempts, scheduled_at)) = claimed else {
            return Ok(None);
        };

        let flush_key: FlushKey = raw_key.parse()?;
        let scheduled_at = DateTime::parse_from_rfc3339(&scheduled_at)
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                warn!(flush_key = %flush_key, "unreadable scheduled_at: {e}");
                Utc::now()
            });

        Ok(Some(FlushJob {
            flush_key,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            scheduled_at,
        }))
    }

    async fn complete(&self, flush_key: &FlushKey) -> Result<()> {
        let mut conn = self.conn.clone();
        let script = scripts::complete();
        let requeued = script
            .key(self.job_key(flush_key))
            .key(self.ready_key())
            .key(self.active_key())
            .arg(flush_key.as_str())
            .arg(Utc::now().to_rfc3339())
            .arg(self.job_ttl_ms())
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| {
                IngestError::Queue(format!("flush complete failed: {e}"))
            })?;
        if requeued == 1 {
            debug!(flush_key = %flush_key, "flush job rescheduled on completion");
        }
        Ok(())
    }

    async fn release(&self, flush_key: &FlushKey) -> Result<()> {
        let mut conn = self.conn.clone();
        let script = scripts::release();
        script
            .key(self.job_key(flush_key))
            .key(self.ready_key())
            .key(self.active_key())
            .arg(flush_key.as_str())
            .arg(self.job_ttl_ms())
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| {
                IngestError::Queue(format!("flush release failed: {e}"))
            })?;
        Ok(())
    }

    async fn pending(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let script = scripts::pending();
        script
            .key(self.ready_key())
            .arg(self.job_prefix())
            .invoke_async::<usize>(&mut conn)
            .await
            .map_err(|e| {
                IngestError::Queue(format!("flush pending count failed: {e}"))
            })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                IngestError::Unavailable(format!("Redis PING failed: {e}"))
            })?;
        Ok(())
    }
}
