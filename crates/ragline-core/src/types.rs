//! Data model shared by the ingestion and retrieval pipelines

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dimension of every embedding stored in the vector collection.
pub const EMBEDDING_DIM: usize = 768;

/// Maximum length, in characters, of the `text` field of a stored record.
pub const MAX_STORED_TEXT_LEN: usize = 200;

/// A text message as published on the ingestion topic.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingTextMessage {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawTextMessage {
    text: String,
    timestamp: String,
}

#[derive(Serialize)]
struct OutgoingTextMessage<'a> {
    text: &'a str,
    timestamp: String,
}

impl IncomingTextMessage {
    pub fn new(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }

    /// Decode a raw stream payload.
    ///
    /// The payload must be UTF-8 JSON of the form
    /// `{ "text": string, "timestamp": ISO-8601 string }`. Timestamps without
    /// an offset are taken as UTC. Unknown fields are ignored.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let raw: RawTextMessage = serde_json::from_slice(payload)
            .map_err(|e| Error::Parse(format!("invalid text message payload: {}", e)))?;
        let timestamp = parse_timestamp(&raw.timestamp)?;
        Ok(Self {
            text: raw.text,
            timestamp,
        })
    }

    /// Encode the message in the same wire shape accepted by [`Self::from_json`].
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let outgoing = OutgoingTextMessage {
            text: &self.text,
            timestamp: self.timestamp.to_rfc3339(),
        };
        Ok(serde_json::to_vec(&outgoing)?)
    }

    /// Whole seconds since the Unix epoch.
    pub fn timestamp_unix(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::Parse(format!("invalid ISO-8601 timestamp: {:?}", value)))
}

/// A bounded slice of a message's text, in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub content: String,
    pub ordinal: usize,
}

/// A fixed-dimension embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Vec<f32>,
}

impl EmbeddingVector {
    /// Wrap raw values, rejecting anything that is not [`EMBEDDING_DIM`] long.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(Error::Integrity(format!(
                "embedding has dimension {}, expected {}",
                values.len(),
                EMBEDDING_DIM
            )));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> f32 {
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm_a: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

/// The durable unit written to the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub text: String,
    pub embedding: EmbeddingVector,
    pub timestamp_unix: i64,
}

/// What the store reports back after an insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted_count: usize,
    pub ids: Vec<u64>,
}

/// One similarity-search match.
///
/// `distance` is the store's metric value as returned. For the cosine
/// collection it is a similarity: larger means closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    pub distance: f32,
    pub text: String,
}

/// Texts of the hits that passed relevance filtering, in store order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalContext {
    texts: Vec<String>,
}

impl RetrievalContext {
    /// Keep hits whose score is strictly above `threshold`. Order is preserved.
    pub fn from_hits(hits: Vec<SearchHit>, threshold: f32) -> Self {
        let texts = hits
            .into_iter()
            .filter(|hit| hit.distance > threshold)
            .map(|hit| hit.text)
            .collect();
        Self { texts }
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Newline-separated context block.
    pub fn render(&self) -> String {
        self.texts.join("\n")
    }
}
