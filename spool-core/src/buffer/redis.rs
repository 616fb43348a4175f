use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::BufferStore;
use crate::error::{IngestError, Result};
use crate::keys::BufferKey;

/// Buffers backed by Redis lists (`RPUSH` keeps append order).
#[derive(Clone)]
pub struct RedisBufferStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBufferStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBufferStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisBufferStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting buffer store to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| {
            IngestError::Unavailable(format!(
                "Failed to create Redis client: {e}"
            ))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            IngestError::Unavailable(format!("Failed to connect to Redis: {e}"))
        })?;

        info!("Buffer store connected to Redis");

        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl BufferStore for RedisBufferStore {
    async fn append(&self, key: &BufferKey, payload: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let len = conn
            .rpush::<_, _, i64>(key.as_str(), payload)
            .await
            .map_err(|e| IngestError::Store(format!("Redis RPUSH failed: {e}")))?;
        debug!(buffer_key = %key, len, "buffer append");
        Ok(())
    }

    async fn set_expiry(&self, key: &BufferKey, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1) as i64;
        conn.expire::<_, ()>(key.as_str(), seconds)
            .await
            .map_err(|e| {
                IngestError::Store(format!("Redis EXPIRE failed: {e}"))
            })?;
        Ok(())
    }

    async fn read(&self, key: &BufferKey) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let payloads = conn
            .lrange::<_, Vec<String>>(key.as_str(), 0, -1)
            .await
            .map_err(|e| {
                IngestError::Store(format!("Redis LRANGE failed: {e}"))
            })?;
        debug!(buffer_key = %key, read = payloads.len(), "buffer read");
        Ok(payloads)
    }

    async fn trim_front(&self, key: &BufferKey, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        // LTRIM past the end empties the list, which deletes the key.
        let start = isize::try_from(count).unwrap_or(isize::MAX);
        conn.ltrim::<_, ()>(key.as_str(), start, -1)
            .await
            .map_err(|e| {
                IngestError::Store(format!("Redis LTRIM failed: {e}"))
            })?;
        debug!(buffer_key = %key, trimmed = count, "buffer trimmed");
        Ok(())
    }

    async fn len(&self, key: &BufferKey) -> Result<usize> {
        let mut conn = self.conn.clone();
        conn.llen::<_, usize>(key.as_str())
            .await
            .map_err(|e| IngestError::Store(format!("Redis LLEN failed: {e}")))
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
