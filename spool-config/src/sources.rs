use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{ParsedVar, non_empty_var, parse_var};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    pub redis: Option<FileRedisConfig>,
    #[serde(default)]
    pub ingestion: FileIngestionConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileRedisConfig {
    pub url: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileIngestionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_visibility_timeout_seconds: Option<u64>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub server_host: Option<String>,
    pub server_port: Option<ParsedVar<u16>>,
    pub redis_url: Option<String>,
    pub buffer_ttl_seconds: Option<ParsedVar<u64>>,
    pub queue_prefix: Option<String>,
    pub flush_visibility_timeout_seconds: Option<ParsedVar<u64>>,
    pub config_path: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            server_host: non_empty_var("SERVER_HOST"),
            server_port: parse_var("SERVER_PORT"),
            redis_url: non_empty_var("REDIS_URL"),
            buffer_ttl_seconds: parse_var("INGESTION_BUFFER_TTL_SECONDS"),
            queue_prefix: non_empty_var("INGESTION_QUEUE_PREFIX"),
            flush_visibility_timeout_seconds: parse_var(
                "INGESTION_FLUSH_VISIBILITY_TIMEOUT_SECONDS",
            ),
            config_path: non_empty_var("SPOOL_CONFIG_PATH").map(PathBuf::from),
        }
    }
}
