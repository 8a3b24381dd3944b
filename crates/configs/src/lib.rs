//! # configs
//!
//! Layered application configuration. Later layers win:
//!
//! 1. built-in defaults
//! 2. `config/default.{toml,yaml,json}` (optional)
//! 3. the file named by `TRADING_POST_CONFIG` (optional)
//! 4. `TRADING_POST__SECTION__KEY` environment variables, after `.env` is loaded
//!
//! e.g. `TRADING_POST__SERVER__PORT=9000` or
//! `TRADING_POST__STORAGE__DATABASE_URL=postgres://...`.

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const ENV_PREFIX: &str = "TRADING_POST";
const CONFIG_PATH_VAR: &str = "TRADING_POST_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aggregator: AggregatorConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AggregatorConfig {
    pub image_fetch_timeout_ms: u64,
    pub author_lookup_timeout_ms: u64,
    pub max_concurrent_resolutions: usize,
}

impl AggregatorConfig {
    pub fn image_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.image_fetch_timeout_ms)
    }

    pub fn author_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.author_lookup_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    Memory,
    Local,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub backend: DataBackend,
    pub media_backend: MediaBackend,
    pub media_root: String,
    /// Read ceiling for a single image.
    pub max_image_bytes: u64,
    pub database_url: Option<SecretString>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

fn with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("aggregator.image_fetch_timeout_ms", 10_000)?
        .set_default("aggregator.author_lookup_timeout_ms", 5_000)?
        .set_default("aggregator.max_concurrent_resolutions", 16)?
        .set_default("storage.backend", "memory")?
        .set_default("storage.media_backend", "memory")?
        .set_default("storage.media_root", "./data/media")?
        .set_default("storage.max_image_bytes", 5 * 1024 * 1024)?
        .set_default("storage.max_connections", 10)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "pretty")?)
}

impl AppConfig {
    /// Loads configuration from files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), ".env loaded");
        }
        let mut builder =
            with_defaults()?.add_source(File::with_name("config/default").required(false));
        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML document. Environment is not consulted.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = with_defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == DataBackend::Postgres && self.storage.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "storage.database_url is required for the postgres backend".into(),
            ));
        }
        if self.storage.max_image_bytes == 0 {
            return Err(ConfigError::Invalid("storage.max_image_bytes must be positive".into()));
        }
        if self.aggregator.max_concurrent_resolutions == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.max_concurrent_resolutions must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_describe_a_self_contained_memory_setup() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.storage.backend, DataBackend::Memory);
        assert_eq!(config.storage.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(config.aggregator.image_fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 9000

            [storage]
            backend = "postgres"
            media_backend = "local"
            database_url = "postgres://localhost/trading_post"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.media_backend, MediaBackend::Local);
        assert_eq!(
            config.storage.database_url.as_ref().unwrap().expose_secret(),
            "postgres://localhost/trading_post"
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn postgres_without_url_is_rejected() {
        let err = AppConfig::from_toml("[storage]\nbackend = \"postgres\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn database_url_is_redacted_in_debug_output() {
        let config = AppConfig::from_toml(
            "[storage]\nbackend = \"postgres\"\ndatabase_url = \"postgres://user:hunter2@db/tp\"",
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
