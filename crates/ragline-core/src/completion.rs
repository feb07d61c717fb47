//! Completion (chat) client trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Finish reason reported by a completion that ended normally.
pub const FINISH_REASON_STOP: &str = "stop";

/// Result of a chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub finish_reason: String,
    pub done: bool,
}

impl ChatCompletion {
    /// A completion is usable only when it finished, stopped on its own and
    /// produced content.
    pub fn is_normal_stop(&self) -> bool {
        self.done && self.finish_reason == FINISH_REASON_STOP && self.content.is_some()
    }

    /// Take the generated text, or an [`Error::Upstream`] describing why the
    /// completion was rejected.
    pub fn into_answer(self) -> Result<String> {
        if !self.is_normal_stop() {
            return Err(Error::Upstream(format!(
                "completion rejected: done={}, finish_reason={:?}, has_content={}",
                self.done,
                self.finish_reason,
                self.content.is_some()
            )));
        }
        self.content
            .ok_or_else(|| Error::Upstream("completion returned no content".to_string()))
    }
}

/// Trait for chat completion providers (e.g., Ollama)
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a system prompt and a user prompt, returning the model's reply
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion>;

    /// Get the chat model being used
    fn model_id(&self) -> &str;
}
