//! Message stream trait and types

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Position of a message in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamCoordinates {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for StreamCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic={} partition={} offset={}",
            self.topic, self.partition, self.offset
        )
    }
}

/// A raw message pulled from the stream, not yet decoded.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub coordinates: StreamCoordinates,
    pub payload: Vec<u8>,
}

/// Pull-based consumer with explicit offset commits.
///
/// `next_message` may be dropped while pending (for example on shutdown);
/// anything fetched but not yet returned is simply redelivered later, since
/// only [`MessageStream::commit`] advances the durable position.
#[async_trait]
pub trait MessageStream: Send {
    /// Next message, or `None` once the stream is exhausted
    async fn next_message(&mut self) -> Result<Option<StreamMessage>>;

    /// Durably mark the message at `coordinates` as processed
    async fn commit(&mut self, coordinates: &StreamCoordinates) -> Result<()>;

    /// Release broker-side resources
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
