use once_cell::sync::Lazy;
use spool_core::{
    DEFAULT_BUFFER_TTL, DEFAULT_QUEUE_PREFIX, DEFAULT_VISIBILITY_TIMEOUT,
};
use std::{fs, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{
    models::{
        Config, ConfigMetadata, IngestionConfig, RedisConfig, ServerConfig,
    },
    sources::{EnvConfig, FileConfig},
    util::ParsedVar,
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("spool.toml"),
        PathBuf::from("config/spool.toml"),
    ]
});

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const REDIS_SCHEMES: &[&str] = &["redis", "rediss", "redis+unix", "unix"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, reads the process environment and composes the result
    /// with the configuration file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes configuration from already-gathered environment values.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            self.compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) =
            match (&self.options.config_path, &env.config_path) {
                (Some(path), _) | (None, Some(path)) => (Some(path.clone()), true),
                (None, None) => (
                    DEFAULT_CONFIG_LOCATIONS
                        .iter()
                        .find(|candidate| candidate.exists())
                        .cloned(),
                    false,
                ),
            };

        let Some(path) = path else {
            return Ok((None, None));
        };
        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        debug!(path = %path.display(), "loaded configuration file");
        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No spool.toml detected; falling back to environment variables",
                "Create spool.toml or set SPOOL_CONFIG_PATH to keep settings in a file",
            );
        }

        let FileConfig {
            server: file_server,
            redis: file_redis,
            ingestion: file_ingestion,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: required_value("SERVER_PORT", env.server_port)?
                .or(file_server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        let redis = match env.redis_url.or(file_redis.map(|r| r.url)) {
            Some(url) => Some(RedisConfig {
                url: validate_redis_url(url)?,
            }),
            None => None,
        };

        let buffer_ttl = required_value(
            "INGESTION_BUFFER_TTL_SECONDS",
            env.buffer_ttl_seconds,
        )?
        .or(file_ingestion.buffer_ttl_seconds)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_BUFFER_TTL);

        let flush_visibility_timeout = required_value(
            "INGESTION_FLUSH_VISIBILITY_TIMEOUT_SECONDS",
            env.flush_visibility_timeout_seconds,
        )?
        .or(file_ingestion.flush_visibility_timeout_seconds)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);

        let ingestion = IngestionConfig {
            buffer_ttl,
            queue_prefix: env
                .queue_prefix
                .or(file_ingestion.queue_prefix)
                .unwrap_or_else(|| DEFAULT_QUEUE_PREFIX.to_string()),
            flush_visibility_timeout,
        };

        let config = Config {
            server,
            redis,
            ingestion,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok((config, warnings))
    }
}

/// A variable that is set must parse; an unset one falls through.
fn required_value<T>(
    key: &'static str,
    parsed: Option<ParsedVar<T>>,
) -> Result<Option<T>, ConfigLoadError> {
    match parsed {
        None => Ok(None),
        Some(ParsedVar {
            value: Some(value), ..
        }) => Ok(Some(value)),
        Some(ParsedVar { raw, value: None }) => {
            Err(ConfigLoadError::InvalidValue { key, value: raw })
        }
    }
}

fn validate_redis_url(raw: String) -> Result<String, ConfigLoadError> {
    let parsed = Url::parse(&raw)
        .map_err(|source| ConfigLoadError::InvalidRedisUrl { source })?;
    if !REDIS_SCHEMES.contains(&parsed.scheme()) {
        return Err(ConfigLoadError::UnsupportedRedisScheme {
            scheme: parsed.scheme().to_string(),
        });
    }
    Ok(raw)
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid Redis URL")]
    InvalidRedisUrl {
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported Redis URL scheme '{scheme}'")]
    UnsupportedRedisScheme { scheme: String },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
