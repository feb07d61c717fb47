//! Qdrant configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use ragline_core::{Error, Result, env_opt, env_or, env_parse_opt};

/// Configuration for the Qdrant gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    /// Per-request deadline. Unset lets upserts run as long as the server takes.
    pub timeout_secs: Option<u64>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: Self::DEFAULT_URL.to_string(),
            api_key: None,
            collection: Self::DEFAULT_COLLECTION.to_string(),
            timeout_secs: None,
        }
    }
}

impl QdrantConfig {
    /// gRPC endpoint of a local Qdrant
    pub const DEFAULT_URL: &'static str = "http://localhost:6334";
    pub const DEFAULT_COLLECTION: &'static str = "text_embeddings_schema";
    /// qdrant-client always installs a channel deadline, so "unset" maps to this.
    pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            url: env_or("QDRANT_URL", Self::DEFAULT_URL),
            api_key: env_opt("QDRANT_API_KEY"),
            collection: env_or("QDRANT_COLLECTION", Self::DEFAULT_COLLECTION),
            timeout_secs: env_parse_opt("QDRANT_TIMEOUT_SECS")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)
            .map_err(|e| Error::Configuration(format!("QDRANT_URL {:?}: {}", self.url, e)))?;
        if self.collection.trim().is_empty() {
            return Err(Error::Configuration(
                "QDRANT_COLLECTION must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::Configuration(
                "QDRANT_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(Self::UNBOUNDED_TIMEOUT)
    }
}
