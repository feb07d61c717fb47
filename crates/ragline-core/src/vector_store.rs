//! Vector store gateway trait

use async_trait::async_trait;

use crate::{EmbeddingVector, InsertReport, Result, SearchHit, StoredRecord};

/// Trait for vector stores (e.g., Qdrant)
///
/// The gateway owns a single fixed collection: 768-dimensional vectors with a
/// `text` and a `timestamp_unix` payload field. Record identifiers are
/// assigned on insert.
#[async_trait]
pub trait VectorStoreGateway: Send + Sync {
    /// Create the collection if it does not exist yet
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert a batch of records in one call
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<InsertReport>;

    /// Return the `top_k` nearest records, closest first
    async fn search(&self, vector: &EmbeddingVector, top_k: usize) -> Result<Vec<SearchHit>>;

    /// Get the total number of stored records
    async fn count(&self) -> Result<usize>;

    /// Name of the backing collection
    fn collection_name(&self) -> &str;
}
