//! Pipeline configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::chunker::DEFAULT_CHUNK_LIMIT;
use crate::{Error, Result, RetryPolicy};

/// Read `key`, falling back to `default` when unset.
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// A value that is present but does not parse is a configuration error.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    parse_var(key, env::var(key).ok(), default)
}

/// Read `key` when it is set to a non-empty value.
pub fn env_opt(key: &str) -> Option<String> {
    non_empty(env::var(key).ok())
}

/// Read and parse an optional `key`. Unset or empty means `None`.
pub fn env_parse_opt<T: FromStr>(key: &str) -> Result<Option<T>> {
    parse_opt_var(key, env::var(key).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_opt_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    non_empty(value)
        .map(|raw| {
            raw.trim().parse().map_err(|_| {
                Error::Configuration(format!("{} has an invalid value: {:?}", key, raw))
            })
        })
        .transpose()
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::Configuration(format!("{} has an invalid value: {:?}", key, raw))
        }),
    }
}

/// Sizing for a [`crate::ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolConfig {
    pub size: usize,
    pub max_in_flight: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            max_in_flight: 16,
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            size: parse_var("RAG_POOL_SIZE", lookup("RAG_POOL_SIZE"), defaults.size)?,
            max_in_flight: parse_var(
                "RAG_POOL_MAX_IN_FLIGHT",
                lookup("RAG_POOL_MAX_IN_FLIGHT"),
                defaults.max_in_flight,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.max_in_flight == 0 {
            return Err(Error::Configuration(
                "pool size and max in-flight must both be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tunables for the ingestion and retrieval pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum chunk length in characters (1..=200).
    pub chunk_limit: usize,
    /// Hits must score strictly above this to reach the prompt.
    pub relevance_threshold: f32,
    pub top_k: usize,
    /// Maximum query length in characters.
    pub max_query_len: usize,
    pub search_timeout: Duration,
    /// Replaces the built-in system instruction for answers.
    pub system_prompt: Option<String>,
    pub retry: RetryPolicy,
    /// Pause before the supervisor restarts a failed consumer.
    pub restart_delay: Duration,
    pub pool: PoolConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            relevance_threshold: 0.47,
            top_k: 10,
            max_query_len: 250,
            search_timeout: Duration::from_secs(3),
            system_prompt: None,
            retry: RetryPolicy::default(),
            restart_delay: Duration::from_secs(5),
            pool: PoolConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key);

        let search_timeout_ms = parse_var(
            "RAG_SEARCH_TIMEOUT_MS",
            var("RAG_SEARCH_TIMEOUT_MS"),
            defaults.search_timeout.as_millis() as u64,
        )?;
        let backoff_ms = parse_var(
            "RAG_RETRY_BACKOFF_MS",
            var("RAG_RETRY_BACKOFF_MS"),
            defaults.retry.initial_backoff.as_millis() as u64,
        )?;
        let restart_delay_ms = parse_var(
            "RAG_RESTART_DELAY_MS",
            var("RAG_RESTART_DELAY_MS"),
            defaults.restart_delay.as_millis() as u64,
        )?;

        let config = Self {
            chunk_limit: parse_var("RAG_CHUNK_LIMIT", var("RAG_CHUNK_LIMIT"), defaults.chunk_limit)?,
            relevance_threshold: parse_var(
                "RAG_RELEVANCE_THRESHOLD",
                var("RAG_RELEVANCE_THRESHOLD"),
                defaults.relevance_threshold,
            )?,
            top_k: parse_var("RAG_TOP_K", var("RAG_TOP_K"), defaults.top_k)?,
            max_query_len: parse_var(
                "RAG_MAX_QUERY_LEN",
                var("RAG_MAX_QUERY_LEN"),
                defaults.max_query_len,
            )?,
            search_timeout: Duration::from_millis(search_timeout_ms),
            system_prompt: non_empty(var("RAG_SYSTEM_PROMPT")),
            retry: RetryPolicy {
                max_attempts: parse_var(
                    "RAG_RETRY_MAX_ATTEMPTS",
                    var("RAG_RETRY_MAX_ATTEMPTS"),
                    defaults.retry.max_attempts,
                )?,
                initial_backoff: Duration::from_millis(backoff_ms),
                ..defaults.retry
            },
            restart_delay: Duration::from_millis(restart_delay_ms),
            pool: PoolConfig::from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=DEFAULT_CHUNK_LIMIT).contains(&self.chunk_limit) {
            return Err(Error::Configuration(format!(
                "RAG_CHUNK_LIMIT must be between 1 and {}, got {}",
                DEFAULT_CHUNK_LIMIT, self.chunk_limit
            )));
        }
        if self.top_k == 0 {
            return Err(Error::Configuration("RAG_TOP_K must be positive".to_string()));
        }
        if self.max_query_len == 0 {
            return Err(Error::Configuration(
                "RAG_MAX_QUERY_LEN must be positive".to_string(),
            ));
        }
        if !self.relevance_threshold.is_finite() {
            return Err(Error::Configuration(
                "RAG_RELEVANCE_THRESHOLD must be a finite number".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "RAG_RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        self.pool.validate()
    }
}
