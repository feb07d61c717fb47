//! Stream-driven ingestion: parse, chunk, embed, insert, verify, commit

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use ragline_core::{
    Chunker, EmbeddingClient, Error, IncomingTextMessage, MessageStream, PipelineConfig, Result,
    RetryPolicy, StoredRecord, StreamCoordinates, StreamMessage, VectorStoreGateway,
};

/// Where the pipeline is in handling the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    Idle,
    Parsing,
    Chunking,
    Embedding,
    Inserting,
    Verifying,
    Committing,
    Failed,
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestionState::Idle => "idle",
            IngestionState::Parsing => "parsing",
            IngestionState::Chunking => "chunking",
            IngestionState::Embedding => "embedding",
            IngestionState::Inserting => "inserting",
            IngestionState::Verifying => "verifying",
            IngestionState::Committing => "committing",
            IngestionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one committed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub coordinates: StreamCoordinates,
    pub chunk_count: usize,
    pub inserted_ids: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Shutdown,
    EndOfStream,
}

/// Totals for one run of the consumption loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub messages_committed: usize,
    pub chunks_inserted: usize,
    pub stopped_by: StopReason,
}

/// Sequential ingestion of one message at a time.
///
/// A message's offset is committed only after every chunk it produced is
/// confirmed stored. Any earlier failure leaves it uncommitted.
pub struct IngestionPipeline {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStoreGateway>,
    retry: RetryPolicy,
    state: watch::Sender<IngestionState>,
}

impl IngestionPipeline {
    pub fn new(
        config: &PipelineConfig,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStoreGateway>,
    ) -> Result<Self> {
        let (state, _) = watch::channel(IngestionState::Idle);
        Ok(Self {
            chunker: Chunker::new(config.chunk_limit)?,
            embedder,
            store,
            retry: config.retry.clone(),
            state,
        })
    }

    pub fn state(&self) -> IngestionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<IngestionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: IngestionState) {
        debug!(state = %next, "ingestion state");
        self.state.send_replace(next);
    }

    /// Run one message through the pipeline and commit it on success.
    pub async fn process_message<S>(
        &self,
        stream: &mut S,
        message: StreamMessage,
    ) -> Result<IngestReport>
    where
        S: MessageStream + ?Sized,
    {
        let coordinates = message.coordinates.clone();
        match self.ingest(stream, message).await {
            Ok(report) => {
                self.transition(IngestionState::Idle);
                info!(
                    topic = %coordinates.topic,
                    partition = coordinates.partition,
                    offset = coordinates.offset,
                    chunks = report.chunk_count,
                    "message committed"
                );
                Ok(report)
            }
            Err(err) => {
                self.transition(IngestionState::Failed);
                error!(
                    topic = %coordinates.topic,
                    partition = coordinates.partition,
                    offset = coordinates.offset,
                    kind = ?err.kind(),
                    error = %err,
                    "message ingestion failed"
                );
                Err(err)
            }
        }
    }

    async fn ingest<S>(&self, stream: &mut S, message: StreamMessage) -> Result<IngestReport>
    where
        S: MessageStream + ?Sized,
    {
        self.transition(IngestionState::Parsing);
        let incoming = IncomingTextMessage::from_json(&message.payload)?;

        self.transition(IngestionState::Chunking);
        let texts: Vec<String> = self
            .chunker
            .chunk(&incoming.text)
            .into_iter()
            .map(|chunk| chunk.content)
            .collect();

        if texts.is_empty() {
            self.transition(IngestionState::Committing);
            stream.commit(&message.coordinates).await?;
            return Ok(IngestReport {
                coordinates: message.coordinates,
                chunk_count: 0,
                inserted_ids: Vec::new(),
            });
        }

        self.transition(IngestionState::Embedding);
        let vectors = self
            .retry
            .run("embed", || self.embedder.embed(&texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(Error::Integrity(format!(
                "embedding service returned {} vectors for {} chunks",
                vectors.len(),
                texts.len()
            )));
        }

        let timestamp_unix = incoming.timestamp_unix();
        let records: Vec<StoredRecord> = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, embedding)| StoredRecord {
                text,
                embedding,
                timestamp_unix,
            })
            .collect();
        let batch_size = records.len();

        self.transition(IngestionState::Inserting);
        let report = self
            .retry
            .run("insert", || self.store.insert(records.clone()))
            .await?;

        self.transition(IngestionState::Verifying);
        if report.inserted_count != batch_size {
            return Err(Error::Integrity(format!(
                "vector store inserted {} of {} records",
                report.inserted_count, batch_size
            )));
        }

        self.transition(IngestionState::Committing);
        stream.commit(&message.coordinates).await?;

        Ok(IngestReport {
            coordinates: message.coordinates,
            chunk_count: batch_size,
            inserted_ids: report.ids,
        })
    }

    /// Consume `stream` until it ends, shutdown is signalled, or a message fails.
    ///
    /// Shutdown is observed between messages and while waiting for the next
    /// one. A message already being processed always runs to completion.
    pub async fn run<S>(
        &self,
        stream: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary>
    where
        S: MessageStream + ?Sized,
    {
        let mut messages_committed = 0;
        let mut chunks_inserted = 0;

        let stopped_by = loop {
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break StopReason::Shutdown,
                next = stream.next_message() => next?,
            };
            let Some(message) = next else {
                break StopReason::EndOfStream;
            };

            let report = self.process_message(stream, message).await?;
            messages_committed += 1;
            chunks_inserted += report.chunk_count;
        };

        info!(
            messages_committed,
            chunks_inserted,
            stopped_by = ?stopped_by,
            "ingestion loop stopped"
        );
        Ok(RunSummary {
            messages_committed,
            chunks_inserted,
            stopped_by,
        })
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
