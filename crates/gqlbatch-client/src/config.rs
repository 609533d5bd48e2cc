//! Configuration management for the batched client.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use gqlbatch_client::config::ClientConfig;
//!
//! // Load from file with env overrides
//! let config = ClientConfig::load("gqlbatch.yaml")?;
//!
//! // Or load from environment only
//! let config = ClientConfig::from_env()?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use gqlbatch_core::{CoalescerConfig, FailurePolicy, FlushMode};
use reqwest::header::HeaderName;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    /// Upstream endpoint settings
    #[serde(default)]
    pub endpoint: EndpointSettings,

    /// Batching settings
    #[serde(default)]
    pub batching: BatchingSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Upstream GraphQL endpoint.
///
/// # Example YAML Configuration
///
/// ```yaml
/// endpoint:
///   url: https://api.example.com/graphql
///   headers:
///     authorization: Bearer abc123
///   timeout_ms: 10000
///   user_agent: my-service/1.2
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointSettings {
    /// URL every batch is POSTed to.
    /// Environment variable: `GQLBATCH_ENDPOINT__URL`
    #[serde(default = "default_url")]
    pub url: String,

    /// Extra headers sent with every batch. Merged over
    /// `Content-Type: application/json`, so a configured content type wins.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Whole-request timeout for one batch, in milliseconds. None waits
    /// indefinitely.
    /// Environment variable: `GQLBATCH_ENDPOINT__TIMEOUT_MS`
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// `User-Agent` sent with every batch.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            headers: BTreeMap::new(),
            timeout_ms: None,
            user_agent: None,
        }
    }
}

fn default_url() -> String {
    "http://localhost:4000/graphql".to_string()
}

/// Batching behaviour of the coalescer.
///
/// - `GQLBATCH_BATCHING__CACHE_RESULTS=true` - Share results of identical requests
/// - `GQLBATCH_BATCHING__MAX_BATCH_SIZE=25` - Cap the number of requests per batch
/// - `GQLBATCH_BATCHING__FAILURE_POLICY=per_item` - Stop escalating item failures
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BatchingSettings {
    /// Reuse the pending result of a byte-identical request.
    ///
    /// Defaults to `false`: every request takes its own slot in a batch.
    #[serde(default)]
    pub cache_results: bool,

    /// Maximum requests per batch. Unbounded when absent.
    #[serde(default)]
    pub max_batch_size: Option<usize>,

    /// How a failing entry of a combined response is attributed.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// When open batches are flushed.
    #[serde(default)]
    pub flush_mode: FlushMode,
}

impl BatchingSettings {
    /// Coalescer configuration for these settings.
    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig {
            cache_results: self.cache_results,
            max_batch_size: self.max_batch_size,
            flush_mode: self.flush_mode,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Also log when batch spans open and close.
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ClientConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `GQLBATCH_` and use `__` as
    /// separator. For example `GQLBATCH_ENDPOINT__URL=...` overrides
    /// `endpoint.url`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ClientConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let client_config: ClientConfig = config.try_deserialize()?;
        client_config.validate()?;

        Ok(client_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ClientConfig::default())?)
            .add_source(environment())
            .build()?;

        let client_config: ClientConfig = config.try_deserialize()?;
        client_config.validate()?;

        Ok(client_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if let Err(err) = Url::parse(&self.endpoint.url) {
            return Err(ConfigLoadError::Invalid {
                message: format!("endpoint.url is not a valid URL ({err}): {}", self.endpoint.url),
            });
        }

        if let Some(name) = self
            .endpoint
            .headers
            .keys()
            .find(|name| HeaderName::from_bytes(name.as_bytes()).is_err())
        {
            return Err(ConfigLoadError::Invalid {
                message: format!("endpoint.headers contains an invalid header name: {name:?}"),
            });
        }

        if self.endpoint.timeout_ms == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "endpoint.timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.batching.max_batch_size == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "batching.max_batch_size must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

// GQLBATCH_BATCHING__MAX_BATCH_SIZE -> batching.max_batch_size
fn environment() -> Environment {
    Environment::with_prefix("GQLBATCH")
        .prefix_separator("_")
        .separator("__")
}
