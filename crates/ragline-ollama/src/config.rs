//! Ollama configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use ragline_core::{Error, Result, env_or, env_parse_opt};

/// Configuration for the Ollama client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub host: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Client-side request timeout. Unset leaves calls bounded by the server only.
    pub timeout_secs: Option<u64>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HOST)
    }
}

impl OllamaConfig {
    pub const DEFAULT_HOST: &'static str = "http://localhost:11434";
    pub const DEFAULT_CHAT_MODEL: &'static str = "deepseek-r1:32b";
    pub const DEFAULT_EMBEDDING_MODEL: &'static str = "nomic-embed-text";

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = normalize_host(&env_or("OLLAMA_HOST", Self::DEFAULT_HOST));
        let chat_model = env_or("OLLAMA_MODEL", Self::DEFAULT_CHAT_MODEL);
        let embedding_model = env_or("OLLAMA_EMBEDDING_MODEL", Self::DEFAULT_EMBEDDING_MODEL);
        let timeout_secs = env_parse_opt("OLLAMA_TIMEOUT_SECS")?;

        let config = Self {
            host,
            chat_model,
            embedding_model,
            timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration with explicit host and default models
    pub fn new(host: impl AsRef<str>) -> Self {
        Self {
            host: normalize_host(host.as_ref()),
            chat_model: Self::DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: Self::DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.host)
            .map_err(|e| Error::Configuration(format!("OLLAMA_HOST {:?}: {}", self.host, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "OLLAMA_HOST must be an http(s) URL, got {:?}",
                self.host
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::Configuration(
                "OLLAMA_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Full URL of an API path such as `api/embed`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.host.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Ollama's own `OLLAMA_HOST` convention allows `host:port` without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
