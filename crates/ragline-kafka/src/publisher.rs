//! Kafka REST proxy publisher

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use ragline_core::{Error, IncomingTextMessage, Result, StreamCoordinates};

use crate::config::KafkaRestConfig;
use crate::consumer::{KAFKA_BINARY_V2_JSON, KAFKA_V2_JSON, connection_error, ensure_success};

/// Publishes text messages onto the ingestion topic
pub struct TextPublisher {
    config: KafkaRestConfig,
    client: Client,
}

#[derive(Serialize)]
struct ProduceRecord {
    value: String,
}

#[derive(Serialize)]
struct ProduceRequest {
    records: Vec<ProduceRecord>,
}

#[derive(Deserialize)]
struct ProducedOffset {
    partition: Option<i32>,
    offset: Option<i64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ProduceResponse {
    offsets: Vec<ProducedOffset>,
}

pub(crate) fn encode_message(message: &IncomingTextMessage) -> Result<String> {
    Ok(STANDARD.encode(message.to_json()?))
}

impl TextPublisher {
    pub fn new(config: KafkaRestConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create a publisher from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(KafkaRestConfig::from_env()?)
    }

    /// Publish one message and return where the broker placed it
    pub async fn publish(&self, message: &IncomingTextMessage) -> Result<StreamCoordinates> {
        let url = self.config.endpoint(&format!("topics/{}", self.config.topic));
        let request = ProduceRequest {
            records: vec![ProduceRecord {
                value: encode_message(message)?,
            }],
        };

        let response = self
            .config
            .authorize(self.client.post(&url))
            .header("Content-Type", KAFKA_BINARY_V2_JSON)
            .header("Accept", KAFKA_V2_JSON)
            .json(&request)
            .send()
            .await
            .map_err(|e| connection_error(&url, e))?;
        let produced: ProduceResponse = ensure_success(response, "publish")
            .await?
            .json()
            .await
            .map_err(|e| Error::Stream(format!("invalid publish response: {}", e)))?;

        let offset = produced
            .offsets
            .into_iter()
            .next()
            .ok_or_else(|| Error::Stream("publish response has no offsets".to_string()))?;
        if let Some(error) = offset.error {
            return Err(Error::Stream(format!("broker rejected record: {}", error)));
        }

        let coordinates = StreamCoordinates {
            topic: self.config.topic.clone(),
            partition: offset.partition.unwrap_or_default(),
            offset: offset.offset.unwrap_or_default(),
        };
        info!(%coordinates, "published text message");
        Ok(coordinates)
    }
}
