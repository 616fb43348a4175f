use std::sync::Arc;

use spool_config::Config;
use spool_core::{
    BufferStore, FlushQueue, InMemoryBufferStore, InMemoryFlushQueue,
    IngestionEnqueuer, QueueSettings, RedisBufferStore, RedisFlushQueue,
};
use tracing::{error, info, warn};

use crate::infra::app_state::{AppState, Backend};

/// The store and queue shared by the HTTP handlers and the flush worker.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Option<Arc<dyn BufferStore>>,
    pub queue: Option<Arc<dyn FlushQueue>>,
    pub backend: Backend,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("store", &self.store.is_some())
            .field("queue", &self.queue.is_some())
            .field("backend", &self.backend)
            .finish()
    }
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self::in_memory_with(QueueSettings::default())
    }

    pub fn in_memory_with(settings: QueueSettings) -> Self {
        Self {
            store: Some(Arc::new(InMemoryBufferStore::new())),
            queue: Some(Arc::new(InMemoryFlushQueue::with_settings(settings))),
            backend: Backend::Memory,
        }
    }

    /// Connects to Redis when configured, otherwise falls back to process
    /// memory.
    ///
    /// A configured Redis that cannot be reached leaves the failed
    /// collaborator unset so ingestion answers 503 instead of silently
    /// buffering somewhere else.
    pub async fn connect(config: &Config) -> Self {
        let Some(redis) = config.redis.as_ref() else {
            warn!(
                "no Redis configured; buffering ingestion events in process memory"
            );
            return Self::in_memory_with(config.queue_settings());
        };

        let store: Option<Arc<dyn BufferStore>> =
            match RedisBufferStore::connect(&redis.url).await {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    error!(error = %err, "buffer store unavailable");
                    None
                }
            };
        let queue: Option<Arc<dyn FlushQueue>> = match RedisFlushQueue::connect(
            &redis.url,
            config.ingestion.queue_prefix.clone(),
        )
        .await
        {
            Ok(queue) => {
                Some(Arc::new(queue.with_settings(config.queue_settings())))
            }
            Err(err) => {
                error!(error = %err, "flush queue unavailable");
                None
            }
        };

        let backend = if store.is_some() && queue.is_some() {
            info!(prefix = %config.ingestion.queue_prefix, "Redis ingestion backend ready");
            Backend::Redis
        } else {
            Backend::Unavailable
        };

        Self {
            store,
            queue,
            backend,
        }
    }

    pub fn enqueuer(&self, config: &Config) -> IngestionEnqueuer {
        let mut enqueuer = IngestionEnqueuer::new(config.enqueue_settings());
        if let Some(store) = &self.store {
            enqueuer = enqueuer.with_store(Arc::clone(store));
        }
        if let Some(queue) = &self.queue {
            enqueuer = enqueuer.with_queue(Arc::clone(queue));
        }
        enqueuer
    }

    pub fn app_state(&self, config: &Config) -> AppState {
        AppState::new(self.enqueuer(config), self.backend)
    }
}
