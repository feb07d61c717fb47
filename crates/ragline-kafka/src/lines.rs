//! Newline-delimited JSON stream

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use ragline_core::{MessageStream, Result, StreamCoordinates, StreamMessage};

/// Reads one JSON message per line from an async reader.
///
/// Line numbers (starting at 0) serve as offsets on partition 0. Blank lines
/// are skipped but still consume a line number. Commits are kept in memory.
pub struct LineStream<R> {
    topic: String,
    lines: Lines<R>,
    next_offset: i64,
    committed: Option<i64>,
}

impl<R: AsyncBufRead + Unpin + Send> LineStream<R> {
    pub fn new(topic: impl Into<String>, reader: R) -> Self {
        Self {
            topic: topic.into(),
            lines: reader.lines(),
            next_offset: 0,
            committed: None,
        }
    }

    /// Offset of the last committed line
    pub fn committed(&self) -> Option<i64> {
        self.committed
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageStream for LineStream<R> {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            let offset = self.next_offset;
            self.next_offset += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(StreamMessage {
                coordinates: StreamCoordinates {
                    topic: self.topic.clone(),
                    partition: 0,
                    offset,
                },
                payload: line.into_bytes(),
            }));
        }
        Ok(None)
    }

    async fn commit(&mut self, coordinates: &StreamCoordinates) -> Result<()> {
        self.committed = Some(coordinates.offset);
        Ok(())
    }
}
