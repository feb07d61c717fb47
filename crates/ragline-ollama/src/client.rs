//! Ollama HTTP client implementation

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragline_core::{
    ChatCompletion, CompletionClient, ConnectionPool, EmbeddingClient, EmbeddingVector, Error,
    PoolConfig, Result,
};

use crate::config::OllamaConfig;

/// Ollama client serving both embeddings and chat
pub struct OllamaClient {
    config: OllamaConfig,
    pool: ConnectionPool<Client>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
}

impl From<ChatResponse> for ChatCompletion {
    fn from(response: ChatResponse) -> Self {
        ChatCompletion {
            content: response.message.map(|m| m.content),
            finish_reason: response.done_reason.unwrap_or_default(),
            done: response.done,
        }
    }
}

impl OllamaClient {
    /// Create a new client with the default pool sizing
    pub fn new(config: OllamaConfig) -> Result<Self> {
        Self::with_pool(config, &PoolConfig::default())
    }

    /// Create a new client holding `pool.size` HTTP connections
    pub fn with_pool(config: OllamaConfig, pool: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.timeout();
        let pool = ConnectionPool::build(pool, |_| {
            let builder = Client::builder();
            let builder = match timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            };
            builder
                .build()
                .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
        })?;
        Ok(Self { config, pool })
    }

    /// Create a new client from environment variables
    pub fn from_env(pool: &PoolConfig) -> Result<Self> {
        let config = OllamaConfig::from_env()?;
        Self::with_pool(config, pool)
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let url = self.config.endpoint(path);
        let client = self.pool.acquire().await?;
        client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| connection_error(&url, e))
    }
}

/// Transport failures before any response are connectivity problems.
fn connection_error(url: &str, err: reqwest::Error) -> Error {
    Error::ServiceUnavailable(format!("Ollama at {} is unreachable: {}", url, err))
}

async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

pub(crate) fn parse_chat_response(body: &str) -> Result<ChatCompletion> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Completion(format!("invalid chat response: {}", e)))?;
    Ok(response.into())
}

pub(crate) fn parse_embed_response(body: &str) -> Result<Vec<EmbeddingVector>> {
    let response: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| Error::EmbeddingService(format!("invalid embed response: {}", e)))?;
    response
        .embeddings
        .into_iter()
        .map(EmbeddingVector::new)
        .collect()
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    async fn embed(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.config.embedding_model,
            input: batch,
        };
        let response = self.post_json("api/embed", &request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = error_body(response).await;
            return Err(Error::EmbeddingService(format!(
                "Ollama embed request failed with status {}: {}",
                status, error_text
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::EmbeddingService(e.to_string()))?;
        let vectors = parse_embed_response(&body)?;
        debug!(
            model = %self.config.embedding_model,
            inputs = batch.len(),
            vectors = vectors.len(),
            "embedded batch"
        );
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            stream: false,
        };
        let response = self.post_json("api/chat", &request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = error_body(response).await;
            return Err(Error::Completion(format!(
                "Ollama chat request failed with status {}: {}",
                status, error_text
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Completion(e.to_string()))?;
        let completion = parse_chat_response(&body)?;
        debug!(
            model = %self.config.chat_model,
            done = completion.done,
            finish_reason = %completion.finish_reason,
            "chat completed"
        );
        Ok(completion)
    }

    fn model_id(&self) -> &str {
        &self.config.chat_model
    }
}
