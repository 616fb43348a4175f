use std::time::Duration;

use thiserror::Error;

use super::models::{Config, IngestionConfig};

/// Buffers shorter than this risk expiring before a busy worker drains them.
const SHORT_BUFFER_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("ingestion buffer TTL must be greater than zero seconds")]
    ZeroBufferTtl,
    #[error("ingestion queue prefix must not be empty")]
    EmptyQueuePrefix,
    #[error("flush visibility timeout must be greater than zero seconds")]
    ZeroVisibilityTimeout,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    validate_ingestion(&config.ingestion, &mut warnings)?;

    if config.redis.is_none() {
        warnings.push_with_hint(
            "REDIS_URL not configured; buffers and flush jobs are kept in process memory",
            "Set REDIS_URL so buffered events survive restarts and flush workers can run elsewhere",
        );
    }

    Ok(warnings)
}

fn validate_ingestion(
    ingestion: &IngestionConfig,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    if ingestion.buffer_ttl.is_zero() {
        return Err(ConfigGuardRailError::ZeroBufferTtl);
    }
    if ingestion.queue_prefix.trim().is_empty() {
        return Err(ConfigGuardRailError::EmptyQueuePrefix);
    }
    if ingestion.flush_visibility_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroVisibilityTimeout);
    }

    if ingestion.buffer_ttl < SHORT_BUFFER_TTL {
        warnings.push_with_hint(
            format!(
                "ingestion buffer TTL is only {}s",
                ingestion.buffer_ttl.as_secs()
            ),
            "Buffers that expire before their flush job runs are lost; prefer a TTL of several minutes",
        );
    }
    if ingestion.queue_prefix.contains(char::is_whitespace) {
        warnings.push(format!(
            "ingestion queue prefix '{}' contains whitespace",
            ingestion.queue_prefix
        ));
    }

    Ok(())
}
