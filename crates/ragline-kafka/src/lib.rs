//! Message stream adapters for ragline
//!
//! Talks to Kafka through the REST proxy v2 API (Confluent REST Proxy or the
//! Redpanda HTTP proxy), and reads newline-delimited JSON from any async
//! reader for local ingestion.

mod config;
mod consumer;
mod lines;
mod publisher;


pub use config::KafkaRestConfig;
pub use consumer::KafkaRestConsumer;
pub use lines::LineStream;
pub use publisher::TextPublisher;

// Re-export core types for convenience
pub use ragline_core::{Error, MessageStream, Result, StreamCoordinates, StreamMessage};
