//! Embedding client trait

use async_trait::async_trait;

use crate::{EmbeddingVector, Error, Result};

/// Trait for embedding services (e.g., Ollama)
///
/// Implementations must return exactly one vector per input, in input order.
/// Callers verify the count before pairing vectors with texts.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed an ordered batch of texts
    async fn embed(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Embed a single text as a batch of one
    async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(Error::Integrity(format!(
                "expected 1 embedding for a single input, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }

    /// Get the embedding model being used
    fn model_id(&self) -> &str;
}
