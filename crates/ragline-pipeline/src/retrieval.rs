//! Query answering grounded in stored chunks

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use ragline_core::{
    CompletionClient, EmbeddingClient, Error, PipelineConfig, Result, RetrievalContext,
    VectorStoreGateway,
};

use crate::prompt::PromptTemplate;

/// Per-request retrieval: embed, search, filter, prompt, complete.
///
/// Holds no mutable state, so one instance serves concurrent requests.
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStoreGateway>,
    completion: Arc<dyn CompletionClient>,
    prompt: PromptTemplate,
    relevance_threshold: f32,
    top_k: usize,
    max_query_len: usize,
    search_timeout: Duration,
}

impl RetrievalPipeline {
    pub fn new(
        config: &PipelineConfig,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStoreGateway>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            embedder,
            store,
            completion,
            prompt: config
                .system_prompt
                .as_deref()
                .map(PromptTemplate::with_system)
                .unwrap_or_default(),
            relevance_threshold: config.relevance_threshold,
            top_k: config.top_k,
            max_query_len: config.max_query_len,
            search_timeout: config.search_timeout,
        }
    }

    /// Reject queries longer than the configured limit, counted in characters.
    pub fn validate_query(&self, query: &str) -> Result<()> {
        let len = query.chars().count();
        if len > self.max_query_len {
            return Err(Error::InvalidArgument(format!(
                "query is {} characters long, the limit is {}",
                len, self.max_query_len
            )));
        }
        Ok(())
    }

    /// Context passages for `query`, without calling the completion model.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalContext> {
        self.validate_query(query)?;

        let vector = self.embedder.embed_one(query).await?;

        let hits = tokio::time::timeout(self.search_timeout, self.store.search(&vector, self.top_k))
            .await
            .map_err(|_| {
                Error::Upstream(format!(
                    "vector search did not finish within {} ms",
                    self.search_timeout.as_millis()
                ))
            })??;

        let total = hits.len();
        let context = RetrievalContext::from_hits(hits, self.relevance_threshold);
        debug!(
            hits = total,
            relevant = context.len(),
            threshold = self.relevance_threshold,
            "filtered search hits"
        );
        Ok(context)
    }

    /// Answer `query` from the stored context.
    pub async fn answer(&self, query: &str) -> Result<String> {
        let context = self.retrieve(query).await?;

        let user_prompt = self.prompt.user_prompt(&context, query);
        let completion = self
            .completion
            .chat(self.prompt.system_prompt(), &user_prompt)
            .await?;

        let finish_reason = completion.finish_reason.clone();
        let answer = completion.into_answer()?;
        info!(
            context_passages = context.len(),
            finish_reason = %finish_reason,
            "query answered"
        );
        Ok(answer)
    }
}
