//! Pipeline tests against in-process fakes

#[cfg(test)]
mod pipeline_tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use insta::assert_snapshot;
    use tokio::sync::watch;

    use ragline_core::{
        ChatCompletion, CompletionClient, EMBEDDING_DIM, EmbeddingClient, EmbeddingVector, Error,
        ErrorKind, InsertReport, MessageStream, PipelineConfig, Result, RetryPolicy, SearchHit,
        StoredRecord, StreamCoordinates, StreamMessage, VectorStoreGateway,
    };

    use crate::{
        IngestionPipeline, IngestionState, PromptTemplate, RetrievalPipeline, StopReason,
    };

    fn unit_vector() -> EmbeddingVector {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[0] = 1.0;
        EmbeddingVector::new(values).unwrap()
    }

    /// Returns one unit vector per input, optionally dropping the last one or
    /// failing transiently a set number of times first.
    #[derive(Default)]
    struct MockEmbedder {
        calls: AtomicUsize,
        transient_failures: usize,
        drop_last: bool,
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl EmbeddingClient for MockEmbedder {
        async fn embed(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.transient_failures {
                return Err(Error::ServiceUnavailable("connection refused".to_string()));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            let mut count = batch.len();
            if self.drop_last {
                count -= 1;
            }
            Ok(vec![unit_vector(); count])
        }

        fn model_id(&self) -> &str {
            "mock-embed"
        }
    }

    /// Records inserts; may under-report the count or delay searches.
    #[derive(Default)]
    struct MockStore {
        inserted: Mutex<Vec<StoredRecord>>,
        short_by: usize,
        hits: Vec<SearchHit>,
        search_delay: Option<Duration>,
    }

    #[async_trait]
    impl VectorStoreGateway for MockStore {
        async fn ensure_collection(&self) -> Result<()> {
            Ok(())
        }

        async fn insert(&self, records: Vec<StoredRecord>) -> Result<InsertReport> {
            let count = records.len() - self.short_by;
            self.inserted.lock().unwrap().extend(records);
            Ok(InsertReport {
                inserted_count: count,
                ids: (1..=count as u64).collect(),
            })
        }

        async fn search(&self, _vector: &EmbeddingVector, top_k: usize) -> Result<Vec<SearchHit>> {
            if let Some(delay) = self.search_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.inserted.lock().unwrap().len())
        }

        fn collection_name(&self) -> &str {
            "mock"
        }
    }

    /// Serves queued payloads, then either ends or waits forever.
    struct RecordingStream {
        pending: VecDeque<StreamMessage>,
        committed: Vec<StreamCoordinates>,
        end_when_empty: bool,
    }

    impl RecordingStream {
        fn new(payloads: &[&str], end_when_empty: bool) -> Self {
            let pending = payloads
                .iter()
                .enumerate()
                .map(|(offset, payload)| StreamMessage {
                    coordinates: StreamCoordinates {
                        topic: "rag-text-local".to_string(),
                        partition: 0,
                        offset: offset as i64,
                    },
                    payload: payload.as_bytes().to_vec(),
                })
                .collect();
            Self {
                pending,
                committed: Vec::new(),
                end_when_empty,
            }
        }
    }

    #[async_trait]
    impl MessageStream for RecordingStream {
        async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }
            if self.end_when_empty {
                return Ok(None);
            }
            std::future::pending().await
        }

        async fn commit(&mut self, coordinates: &StreamCoordinates) -> Result<()> {
            self.committed.push(coordinates.clone());
            Ok(())
        }
    }

    struct ScriptedCompletion {
        completion: ChatCompletion,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedCompletion {
        fn new(content: Option<&str>, finish_reason: &str) -> Self {
            Self {
                completion: ChatCompletion {
                    content: content.map(str::to_string),
                    finish_reason: finish_reason.to_string(),
                    done: true,
                },
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            Ok(self.completion.clone())
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    const ABC: &str = r#"{"text": "A. B. C.", "timestamp": "2024-05-01T08:00:00Z"}"#;

    fn ingestion(embedder: Arc<MockEmbedder>, store: Arc<MockStore>) -> IngestionPipeline {
        IngestionPipeline::new(&PipelineConfig::default(), embedder, store).unwrap()
    }

    fn hit(id: u64, distance: f32, text: &str) -> SearchHit {
        SearchHit {
            id,
            distance,
            text: text.to_string(),
        }
    }

    fn retrieval(store: MockStore, completion: Arc<ScriptedCompletion>) -> RetrievalPipeline {
        RetrievalPipeline::new(
            &PipelineConfig::default(),
            Arc::new(MockEmbedder::default()),
            Arc::new(store),
            completion,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_ingestion_commits_once() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let pipeline = ingestion(embedder.clone(), store.clone());
        let mut stream = RecordingStream::new(&[ABC], true);
        let (_tx, shutdown) = watch::channel(false);

        let summary = pipeline.run(&mut stream, shutdown).await.unwrap();

        assert_eq!(summary.messages_committed, 1);
        assert_eq!(summary.chunks_inserted, 1);
        assert_eq!(summary.stopped_by, StopReason::EndOfStream);
        assert_eq!(stream.committed.len(), 1);
        assert_eq!(stream.committed[0].offset, 0);
        assert_eq!(*embedder.batches.lock().unwrap(), vec![vec!["A. B. C.".to_string()]]);

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].text, "A. B. C.");
        assert_eq!(inserted[0].timestamp_unix, 1_714_550_400);
        assert_eq!(pipeline.state(), IngestionState::Idle);
    }

    #[tokio::test]
    async fn test_short_insert_count_withholds_commit() {
        let store = Arc::new(MockStore {
            short_by: 1,
            ..MockStore::default()
        });
        let pipeline = ingestion(Arc::new(MockEmbedder::default()), store);
        let mut stream = RecordingStream::new(&[ABC], true);
        let message = stream.pending.pop_front().unwrap();

        let err = pipeline.process_message(&mut stream, message).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(stream.committed.is_empty());
        assert_eq!(pipeline.state(), IngestionState::Failed);
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_is_integrity_error() {
        let embedder = Arc::new(MockEmbedder {
            drop_last: true,
            ..MockEmbedder::default()
        });
        let store = Arc::new(MockStore::default());
        let pipeline = ingestion(embedder, store.clone());
        let mut stream = RecordingStream::new(&[ABC], true);
        let (_tx, shutdown) = watch::channel(false);

        let err = pipeline.run(&mut stream, shutdown).await.unwrap_err();

        assert!(matches!(err, Error::Integrity(_)));
        assert!(stream.committed.is_empty());
        assert!(store.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_is_not_committed() {
        let embedder = Arc::new(MockEmbedder::default());
        let pipeline = ingestion(embedder.clone(), Arc::new(MockStore::default()));
        let mut stream = RecordingStream::new(&["{not json", ABC], true);
        let (_tx, shutdown) = watch::channel(false);

        let err = pipeline.run(&mut stream, shutdown).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(stream.committed.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        // the loop stops at the failing message
        assert_eq!(stream.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_commits_without_embedding() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let pipeline = ingestion(embedder.clone(), store.clone());
        let mut stream = RecordingStream::new(
            &[r#"{"text": "  ", "timestamp": "2024-05-01T08:00:00Z"}"#],
            true,
        );
        let (_tx, shutdown) = watch::channel(false);

        let summary = pipeline.run(&mut stream, shutdown).await.unwrap();

        assert_eq!(summary.messages_committed, 1);
        assert_eq!(summary.chunks_inserted, 0);
        assert_eq!(stream.committed.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(store.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_text_is_embedded_as_one_aligned_batch() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let pipeline = ingestion(embedder.clone(), store.clone());
        let sentence = "This sentence is exactly long enough to matter here.";
        let text = vec![sentence; 12].join(" ");
        let payload = format!(r#"{{"text": "{}", "timestamp": "2024-05-01T08:00:00Z"}}"#, text);
        let mut stream = RecordingStream::new(&[payload.as_str()], true);
        let (_tx, shutdown) = watch::channel(false);

        let summary = pipeline.run(&mut stream, shutdown).await.unwrap();

        let batches = embedder.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let inserted = store.inserted.lock().unwrap();
        let stored: Vec<&str> = inserted.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(stored, batches[0]);
        assert_eq!(summary.chunks_inserted, batches[0].len());
        assert!(batches[0].len() > 1);
        assert!(stored.iter().all(|t| t.chars().count() <= 200));
    }

    #[tokio::test]
    async fn test_transient_embedding_failure_is_retried() {
        let embedder = Arc::new(MockEmbedder {
            transient_failures: 2,
            ..MockEmbedder::default()
        });
        let config = PipelineConfig {
            retry: RetryPolicy::with_attempts(3, Duration::from_millis(1)),
            ..PipelineConfig::default()
        };
        let pipeline =
            IngestionPipeline::new(&config, embedder.clone(), Arc::new(MockStore::default()))
                .unwrap();
        let mut stream = RecordingStream::new(&[ABC], true);
        let (_tx, shutdown) = watch::channel(false);

        let summary = pipeline.run(&mut stream, shutdown).await.unwrap();

        assert_eq!(summary.messages_committed, 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_without_retry_is_fatal() {
        let embedder = Arc::new(MockEmbedder {
            transient_failures: 1,
            ..MockEmbedder::default()
        });
        let pipeline = ingestion(embedder, Arc::new(MockStore::default()));
        let mut stream = RecordingStream::new(&[ABC], true);
        let (_tx, shutdown) = watch::channel(false);

        let err = pipeline.run(&mut stream, shutdown).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(stream.committed.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_messages() {
        let pipeline = ingestion(
            Arc::new(MockEmbedder::default()),
            Arc::new(MockStore::default()),
        );
        let mut stream = RecordingStream::new(&[ABC], false);
        let (tx, shutdown) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(&mut stream, shutdown),
        )
        .await
        .expect("loop should stop on shutdown")
        .unwrap();
        stopper.await.unwrap();

        assert_eq!(summary.stopped_by, StopReason::Shutdown);
        assert_eq!(summary.messages_committed, 1);
        assert_eq!(stream.committed.len(), 1);
    }

    /// Requests shutdown from inside the first embedding call, then stalls.
    struct StopDuringEmbed {
        stop: watch::Sender<bool>,
    }

    #[async_trait]
    impl EmbeddingClient for StopDuringEmbed {
        async fn embed(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>> {
            self.stop.send_replace(true);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![unit_vector(); batch.len()])
        }

        fn model_id(&self) -> &str {
            "stop-during-embed"
        }
    }

    #[tokio::test]
    async fn test_shutdown_mid_message_finishes_that_message() {
        let (tx, shutdown) = watch::channel(false);
        let store = Arc::new(MockStore::default());
        let pipeline = IngestionPipeline::new(
            &PipelineConfig::default(),
            Arc::new(StopDuringEmbed { stop: tx }),
            store.clone(),
        )
        .unwrap();
        let mut stream = RecordingStream::new(&[ABC, ABC], false);

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(&mut stream, shutdown),
        )
        .await
        .expect("loop should stop after the in-flight message")
        .unwrap();

        assert_eq!(summary.stopped_by, StopReason::Shutdown);
        assert_eq!(summary.messages_committed, 1);
        assert_eq!(summary.chunks_inserted, 1);
        assert_eq!(stream.committed.len(), 1);
        assert_eq!(stream.committed[0].offset, 0);
        assert_eq!(stream.pending.len(), 1);
        assert_eq!(store.inserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_processes_nothing() {
        let pipeline = ingestion(
            Arc::new(MockEmbedder::default()),
            Arc::new(MockStore::default()),
        );
        let mut stream = RecordingStream::new(&[ABC], true);
        let (_tx, shutdown) = watch::channel(true);

        let summary = pipeline.run(&mut stream, shutdown).await.unwrap();
        assert_eq!(summary.stopped_by, StopReason::Shutdown);
        assert!(stream.committed.is_empty());
    }

    #[tokio::test]
    async fn test_state_transitions_are_observable() {
        let pipeline = ingestion(
            Arc::new(MockEmbedder::default()),
            Arc::new(MockStore::default()),
        );
        let mut states = pipeline.subscribe_state();
        assert_eq!(*states.borrow_and_update(), IngestionState::Idle);

        let mut stream = RecordingStream::new(&[ABC], true);
        let message = stream.pending.pop_front().unwrap();
        pipeline.process_message(&mut stream, message).await.unwrap();

        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), IngestionState::Idle);
        assert_eq!(IngestionState::Committing.to_string(), "committing");
    }

    #[tokio::test]
    async fn test_answer_accepts_normal_stop() {
        let completion = Arc::new(ScriptedCompletion::new(Some("X is a letter."), "stop"));
        let store = MockStore {
            hits: vec![
                hit(1, 0.9, "X is the 24th letter."),
                hit(2, 0.5, "Letters form words."),
                hit(3, 0.47, "boundary"),
                hit(4, 0.3, "unrelated"),
            ],
            ..MockStore::default()
        };
        let pipeline = retrieval(store, completion.clone());

        let answer = pipeline.answer("What is X?").await.unwrap();
        assert_eq!(answer, "X is a letter.");

        let prompts = completion.prompts.lock().unwrap();
        let (system, user) = &prompts[0];
        assert_eq!(system, PromptTemplate::default().system_prompt());
        assert_snapshot!(user, @r"
        Answer the question inside the <question> tags using the information inside the <context> tags.
        <context>
        X is the 24th letter.
        Letters form words.
        </context>
        <question>
        What is X?
        </question>
        ");
    }

    #[tokio::test]
    async fn test_configured_system_prompt_replaces_default() {
        let completion = Arc::new(ScriptedCompletion::new(Some("Oui."), "stop"));
        let config = PipelineConfig {
            system_prompt: Some("Answer in French.".to_string()),
            ..PipelineConfig::default()
        };
        let store = MockStore {
            hits: vec![hit(1, 0.9, "X is the 24th letter.")],
            ..MockStore::default()
        };
        let pipeline = RetrievalPipeline::new(
            &config,
            Arc::new(MockEmbedder::default()),
            Arc::new(store),
            completion.clone(),
        );

        pipeline.answer("What is X?").await.unwrap();
        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts[0].0, "Answer in French.");
        assert_eq!(
            PromptTemplate::with_system("Answer in French.").system_prompt(),
            "Answer in French."
        );
    }

    #[tokio::test]
    async fn test_answer_rejects_truncated_completion() {
        let completion = Arc::new(ScriptedCompletion::new(Some("X is"), "length"));
        let pipeline = retrieval(MockStore::default(), completion);

        let err = pipeline.answer("What is X?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_oversized_query_is_rejected_before_any_call() {
        let completion = Arc::new(ScriptedCompletion::new(Some("unused"), "stop"));
        let pipeline = retrieval(MockStore::default(), completion.clone());

        let err = pipeline.answer(&"q".repeat(251)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(completion.prompts.lock().unwrap().is_empty());

        // exactly at the limit is fine
        assert!(pipeline.validate_query(&"é".repeat(250)).is_ok());
    }

    #[tokio::test]
    async fn test_slow_search_is_upstream_failure() {
        let store = MockStore {
            search_delay: Some(Duration::from_millis(200)),
            ..MockStore::default()
        };
        let config = PipelineConfig {
            search_timeout: Duration::from_millis(10),
            ..PipelineConfig::default()
        };
        let completion = Arc::new(ScriptedCompletion::new(Some("unused"), "stop"));
        let pipeline = RetrievalPipeline::new(
            &config,
            Arc::new(MockEmbedder::default()),
            Arc::new(store),
            completion.clone(),
        );

        let err = pipeline.answer("What is X?").await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(completion.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_with_no_relevant_hits_is_empty() {
        let store = MockStore {
            hits: vec![hit(1, 0.2, "far away")],
            ..MockStore::default()
        };
        let completion = Arc::new(ScriptedCompletion::new(Some("I don't know."), "stop"));
        let pipeline = retrieval(store, completion);

        let context = pipeline.retrieve("anything").await.unwrap();
        assert!(context.is_empty());
        assert_eq!(pipeline.answer("anything").await.unwrap(), "I don't know.");
    }
}
