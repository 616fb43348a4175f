//! Durable per-window event buffers.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::keys::BufferKey;

pub use memory::InMemoryBufferStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisBufferStore;

/// Abstracts the key-value store holding buffered payloads.
///
/// Appends to one key must be safe under concurrent writers and must keep
/// the order in which they were issued. Reads return payloads in append
/// order.
#[async_trait]
pub trait BufferStore: Send + Sync {
    async fn append(&self, key: &BufferKey, payload: String) -> Result<()>;

    /// Resets the key's time-to-live, measured from now.
    async fn set_expiry(&self, key: &BufferKey, ttl: Duration) -> Result<()>;

    /// Every payload in append order, left in place. Missing or expired
    /// buffers yield an empty list.
    async fn read(&self, key: &BufferKey) -> Result<Vec<String>>;

    /// Removes the first `count` payloads, keeping anything appended after
    /// they were read. The buffer is deleted once it is empty.
    async fn trim_front(&self, key: &BufferKey, count: usize) -> Result<()>;

    async fn len(&self, key: &BufferKey) -> Result<usize>;

    async fn ping(&self) -> Result<()>;
}
