//! Configuration loading for the Spool ingestion server.
//!
//! Values are layered: environment variables (optionally seeded from a
//! `.env` file) win over a TOML file, which wins over built-in defaults.
//! Soft problems are surfaced as [`ConfigWarnings`] instead of failing the
//! load.

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader};
pub use models::{
    Config, ConfigMetadata, IngestionConfig, RedisConfig, ServerConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
