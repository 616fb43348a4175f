use std::{path::PathBuf, time::Duration};

use spool_core::{EnqueueSettings, QueueSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: Option<RedisConfig>,
    pub ingestion: IngestionConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// `host:port` suitable for binding a listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn enqueue_settings(&self) -> EnqueueSettings {
        EnqueueSettings {
            buffer_ttl: self.ingestion.buffer_ttl,
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings::for_buffer_ttl(
            self.ingestion.buffer_ttl,
            self.ingestion.flush_visibility_timeout,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Expiry applied to a buffer on every append.
    pub buffer_ttl: Duration,
    /// Namespace for the flush queue's Redis keys.
    pub queue_prefix: String,
    /// How long a claimed flush job may run before it is handed out again.
    pub flush_visibility_timeout: Duration,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
