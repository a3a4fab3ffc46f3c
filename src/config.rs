//! Configuration for the relay
//!
//! All tunables are optional and sourced from the environment:
//! - `DMR_BASE_URL` (default `http://model-runner.docker.internal`)
//! - `DMR_ENGINE_SUFFIX` (default `/engines/llama.cpp/v1`)
//! - `DMR_MODEL_CACHE_TTL` seconds (default 300)
//! - `DMR_CONNECTION_TIMEOUT` seconds (default 30)
//! - `DMR_RETRY_COUNT` (default 2)

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://model-runner.docker.internal";
pub const DEFAULT_ENGINE_SUFFIX: &str = "/engines/llama.cpp/v1";

const ENV_BASE_URL: &str = "DMR_BASE_URL";
const ENV_ENGINE_SUFFIX: &str = "DMR_ENGINE_SUFFIX";
const ENV_MODEL_CACHE_TTL: &str = "DMR_MODEL_CACHE_TTL";
const ENV_CONNECTION_TIMEOUT: &str = "DMR_CONNECTION_TIMEOUT";
const ENV_RETRY_COUNT: &str = "DMR_RETRY_COUNT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Immutable relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the model runner service
    pub base_url: String,

    /// Path appended to the base URL for OpenAI-compatible endpoints
    pub engine_suffix: String,

    /// How long a fetched model list stays fresh
    pub model_cache_ttl: Duration,

    /// Connect timeout for every call, and total timeout for model listing
    pub connection_timeout: Duration,

    /// Per-read timeout for completion calls
    pub read_timeout: Duration,

    /// Retries after the first attempt on transport failures
    pub retry_count: u32,

    /// First backoff delay; doubles on every further attempt
    pub backoff_base: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            engine_suffix: DEFAULT_ENGINE_SUFFIX.to_string(),
            model_cache_ttl: Duration::from_secs(300),
            connection_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            retry_count: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Build config from the process environment (and a `.env` file if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(suffix) = lookup(ENV_ENGINE_SUFFIX) {
            config.engine_suffix = suffix;
        }
        if let Some(ttl) = parse_number(&lookup, ENV_MODEL_CACHE_TTL)? {
            config.model_cache_ttl = Duration::from_secs(ttl);
        }
        if let Some(timeout) = parse_number(&lookup, ENV_CONNECTION_TIMEOUT)? {
            config.connection_timeout = Duration::from_secs(timeout);
        }
        if let Some(retries) = parse_number(&lookup, ENV_RETRY_COUNT)? {
            config.retry_count = u32::try_from(retries).map_err(|_| ConfigError::InvalidNumber {
                var: ENV_RETRY_COUNT,
                value: retries.to_string(),
            })?;
        }

        Ok(config)
    }

    /// Full URL of the OpenAI-compatible API root.
    ///
    /// The suffix is only appended when the base URL doesn't already carry it.
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with(&self.engine_suffix) {
            base.to_string()
        } else {
            format!("{}{}", base, self.engine_suffix)
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_engine_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.engine_suffix = suffix.into();
        self
    }

    pub fn with_model_cache_ttl(mut self, ttl: Duration) -> Self {
        self.model_cache_ttl = ttl;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

fn parse_number<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}
