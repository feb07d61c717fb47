//! Kafka REST proxy configuration

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use ragline_core::{Error, Result, env_opt, env_or, env_parse};

/// Configuration for the REST proxy consumer and publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaRestConfig {
    pub rest_url: String,
    pub topic: String,
    pub environment: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    /// HTTP basic credentials for a secured proxy
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for KafkaRestConfig {
    fn default() -> Self {
        Self {
            rest_url: Self::DEFAULT_REST_URL.to_string(),
            topic: Self::DEFAULT_TOPIC.to_string(),
            environment: "dev".to_string(),
            poll_interval_ms: 500,
            timeout_secs: 30,
            username: None,
            password: None,
        }
    }
}

impl KafkaRestConfig {
    pub const DEFAULT_REST_URL: &'static str = "http://localhost:18082";
    pub const DEFAULT_TOPIC: &'static str = "rag-text-local";

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            rest_url: env_or("KAFKA_REST_URL", Self::DEFAULT_REST_URL),
            topic: env_or("KAFKA_TOPIC_TEXT", Self::DEFAULT_TOPIC),
            environment: env_or("ENVIRONMENT", "dev"),
            poll_interval_ms: env_parse("KAFKA_POLL_INTERVAL_MS", 500)?,
            timeout_secs: env_parse("KAFKA_TIMEOUT_SECS", 30)?,
            username: env_opt("KAFKA_REST_USERNAME"),
            password: env_opt("KAFKA_REST_PASSWORD"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.rest_url).map_err(|e| {
            Error::Configuration(format!("KAFKA_REST_URL {:?}: {}", self.rest_url, e))
        })?;
        if self.topic.trim().is_empty() {
            return Err(Error::Configuration(
                "KAFKA_TOPIC_TEXT must not be empty".to_string(),
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::Configuration(
                "KAFKA_REST_PASSWORD is set without KAFKA_REST_USERNAME".to_string(),
            ));
        }
        Ok(())
    }

    /// Consumer group shared by every instance in one environment
    pub fn consumer_group(&self) -> String {
        format!("ragline-consumer-{}", self.environment)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Attach basic auth when a username is configured.
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    /// Full URL of a proxy path such as `topics/rag-text-local`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.rest_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
