use async_trait::async_trait;
use std::{collections::HashMap, fmt, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use super::BufferStore;
use crate::error::Result;
use crate::keys::BufferKey;

/// Process-local buffer store with lazy TTL eviction.
///
/// Expiry is tracked with [`tokio::time::Instant`], so tests can drive it
/// with a paused clock.
#[derive(Default)]
pub struct InMemoryBufferStore {
    state: Mutex<HashMap<BufferKey, Entry>>,
}

#[derive(Debug, Default)]
struct Entry {
    payloads: Vec<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for InMemoryBufferStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryBufferStore");
        match self.state.try_lock() {
            Ok(state) => {
                debug.field("buffers", &state.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl InMemoryBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live payloads for `key` in append order.
    pub async fn payloads(&self, key: &BufferKey) -> Vec<String> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        state
            .get(key)
            .map(|entry| entry.payloads.clone())
            .unwrap_or_default()
    }

    pub async fn expires_at(&self, key: &BufferKey) -> Option<Instant> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        state.get(key).and_then(|entry| entry.expires_at)
    }

    /// Keys of all live buffers, sorted.
    pub async fn keys(&self) -> Vec<BufferKey> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<BufferKey> = state.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn evict_expired(state: &mut HashMap<BufferKey, Entry>, key: &BufferKey) {
        let now = Instant::now();
        if state.get(key).is_some_and(|entry| entry.is_expired(now)) {
            state.remove(key);
        }
    }
}

#[async_trait]
impl BufferStore for InMemoryBufferStore {
    async fn append(&self, key: &BufferKey, payload: String) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        state.entry(key.clone()).or_default().payloads.push(payload);
        Ok(())
    }

    async fn set_expiry(&self, key: &BufferKey, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        // Like Redis EXPIRE, a missing key is left alone.
        if let Some(entry) = state.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn read(&self, key: &BufferKey) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        Ok(state
            .get(key)
            .map(|entry| entry.payloads.clone())
            .unwrap_or_default())
    }

    async fn trim_front(&self, key: &BufferKey, count: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        let Some(entry) = state.get_mut(key) else {
            return Ok(());
        };
        let count = count.min(entry.payloads.len());
        entry.payloads.drain(..count);
        if entry.payloads.is_empty() {
            state.remove(key);
        }
        Ok(())
    }

    async fn len(&self, key: &BufferKey) -> Result<usize> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state, key);
        Ok(state.get(key).map(|entry| entry.payloads.len()).unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
