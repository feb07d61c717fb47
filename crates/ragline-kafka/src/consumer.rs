//! Kafka REST proxy consumer

use std::collections::VecDeque;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use ragline_core::{Error, MessageStream, Result, StreamCoordinates, StreamMessage};

use crate::config::KafkaRestConfig;

pub(crate) const KAFKA_V2_JSON: &str = "application/vnd.kafka.v2+json";
pub(crate) const KAFKA_BINARY_V2_JSON: &str = "application/vnd.kafka.binary.v2+json";

/// A consumer instance registered with the REST proxy.
///
/// Offsets are never auto-committed; the instance starts from the group's
/// committed position, or the earliest offset for a new group.
pub struct KafkaRestConsumer {
    config: KafkaRestConfig,
    client: Client,
    base_uri: String,
    buffer: VecDeque<StreamMessage>,
    closed: bool,
}

#[derive(Serialize)]
struct CreateInstanceRequest<'a> {
    name: &'a str,
    format: &'a str,
    #[serde(rename = "auto.offset.reset")]
    auto_offset_reset: &'a str,
    #[serde(rename = "auto.commit.enable")]
    auto_commit_enable: &'a str,
}

#[derive(Deserialize)]
struct CreateInstanceResponse {
    instance_id: String,
    base_uri: String,
}

#[derive(Serialize)]
struct SubscriptionRequest<'a> {
    topics: [&'a str; 1],
}

#[derive(Deserialize)]
pub(crate) struct RawRecord {
    topic: String,
    partition: i32,
    offset: i64,
    value: Option<String>,
}

#[derive(Serialize)]
struct CommitOffset<'a> {
    topic: &'a str,
    partition: i32,
    offset: i64,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    offsets: [CommitOffset<'a>; 1],
}

/// Transport failures before any response are connectivity problems.
pub(crate) fn connection_error(url: &str, err: reqwest::Error) -> Error {
    Error::ServiceUnavailable(format!("Kafka REST proxy at {} is unreachable: {}", url, err))
}

pub(crate) async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(Error::Stream(format!(
        "{} failed with status {}: {}",
        action, status, error_text
    )))
}

/// Decode a `GET .../records` body. Values arrive base64-encoded; a null
/// value becomes an empty payload.
pub(crate) fn decode_records(body: &str) -> Result<Vec<StreamMessage>> {
    let records: Vec<RawRecord> = serde_json::from_str(body)
        .map_err(|e| Error::Stream(format!("invalid records response: {}", e)))?;

    records
        .into_iter()
        .map(|record| {
            let payload = match record.value {
                Some(value) => STANDARD.decode(value.as_bytes()).map_err(|e| {
                    Error::Stream(format!(
                        "record at offset {} is not valid base64: {}",
                        record.offset, e
                    ))
                })?,
                None => Vec::new(),
            };
            Ok(StreamMessage {
                coordinates: StreamCoordinates {
                    topic: record.topic,
                    partition: record.partition,
                    offset: record.offset,
                },
                payload,
            })
        })
        .collect()
}

impl KafkaRestConsumer {
    /// Register a consumer instance in the environment's group and subscribe
    /// it to the configured topic.
    pub async fn connect(config: KafkaRestConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let group = config.consumer_group();
        let instance_name = format!("{}-{}", group, Uuid::new_v4().simple());
        let url = config.endpoint(&format!("consumers/{}", group));
        let request = CreateInstanceRequest {
            name: &instance_name,
            format: "binary",
            auto_offset_reset: "earliest",
            auto_commit_enable: "false",
        };

        let response = config
            .authorize(client.post(&url))
            .header("Content-Type", KAFKA_V2_JSON)
            .json(&request)
            .send()
            .await
            .map_err(|e| connection_error(&url, e))?;
        let instance: CreateInstanceResponse = ensure_success(response, "consumer creation")
            .await?
            .json()
            .await
            .map_err(|e| Error::Stream(format!("invalid consumer creation response: {}", e)))?;

        let consumer = Self {
            config,
            client,
            base_uri: instance.base_uri,
            buffer: VecDeque::new(),
            closed: false,
        };
        consumer.subscribe().await?;

        info!(
            group = %group,
            instance = %instance.instance_id,
            topic = %consumer.config.topic,
            "kafka consumer subscribed"
        );
        Ok(consumer)
    }

    async fn subscribe(&self) -> Result<()> {
        let url = format!("{}/subscription", self.base_uri);
        let response = self
            .config
            .authorize(self.client.post(&url))
            .header("Content-Type", KAFKA_V2_JSON)
            .json(&SubscriptionRequest {
                topics: [self.config.topic.as_str()],
            })
            .send()
            .await
            .map_err(|e| connection_error(&url, e))?;
        ensure_success(response, "subscription").await?;
        Ok(())
    }

    async fn fetch(&self) -> Result<Vec<StreamMessage>> {
        let url = format!("{}/records", self.base_uri);
        let response = self
            .config
            .authorize(self.client.get(&url))
            .header("Accept", KAFKA_BINARY_V2_JSON)
            .send()
            .await
            .map_err(|e| connection_error(&url, e))?;
        let body = ensure_success(response, "record fetch")
            .await?
            .text()
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;
        decode_records(&body)
    }
}

#[async_trait]
impl MessageStream for KafkaRestConsumer {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
            if self.closed {
                return Ok(None);
            }

            let batch = self.fetch().await?;
            if batch.is_empty() {
                tokio::time::sleep(self.config.poll_interval()).await;
                continue;
            }
            debug!(records = batch.len(), "fetched records");
            self.buffer.extend(batch);
        }
    }

    /// The proxy stores `offset + 1` as the group position, so the message at
    /// `coordinates` is the last one considered processed.
    async fn commit(&mut self, coordinates: &StreamCoordinates) -> Result<()> {
        let url = format!("{}/offsets", self.base_uri);
        let request = CommitRequest {
            offsets: [CommitOffset {
                topic: &coordinates.topic,
                partition: coordinates.partition,
                offset: coordinates.offset,
            }],
        };
        let response = self
            .config
            .authorize(self.client.post(&url))
            .header("Content-Type", KAFKA_V2_JSON)
            .json(&request)
            .send()
            .await
            .map_err(|e| connection_error(&url, e))?;
        ensure_success(response, "offset commit").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();

        let response = self
            .config
            .authorize(self.client.delete(&self.base_uri))
            .header("Content-Type", KAFKA_V2_JSON)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_uri, e))?;
        if let Err(e) = ensure_success(response, "consumer deletion").await {
            warn!(error = %e, "consumer instance was not deleted cleanly");
        }
        Ok(())
    }
}
