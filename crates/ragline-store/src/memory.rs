//! In-memory vector store

use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use ragline_core::{
    EmbeddingVector, Error, InsertReport, MAX_STORED_TEXT_LEN, Result, SearchHit, StoredRecord,
    VectorStoreGateway,
};

/// Local in-memory vector store, ranked by cosine similarity
pub struct InMemoryVectorStore {
    collection: String,
    records: RwLock<Vec<(u64, StoredRecord)>>,
    next_id: AtomicU64,
}

impl InMemoryVectorStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of everything stored, in insertion order
    pub fn records(&self) -> Result<Vec<StoredRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        Ok(records.iter().map(|(_, record)| record.clone()).collect())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new("text_embeddings_schema")
    }
}

#[async_trait]
impl VectorStoreGateway for InMemoryVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, records: Vec<StoredRecord>) -> Result<InsertReport> {
        if let Some(record) = records
            .iter()
            .find(|r| r.text.chars().count() > MAX_STORED_TEXT_LEN)
        {
            return Err(Error::InvalidArgument(format!(
                "stored text exceeds {} characters: {:?}",
                MAX_STORED_TEXT_LEN, record.text
            )));
        }

        let mut stored = self
            .records
            .write()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            stored.push((id, record));
            ids.push(id);
        }

        Ok(InsertReport {
            inserted_count: ids.len(),
            ids,
        })
    }

    async fn search(&self, vector: &EmbeddingVector, top_k: usize) -> Result<Vec<SearchHit>> {
        let stored = self
            .records
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;

        let mut hits: Vec<SearchHit> = stored
            .iter()
            .map(|(id, record)| SearchHit {
                id: *id,
                distance: vector.cosine_similarity(&record.embedding),
                text: record.text.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.distance.total_cmp(&a.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let stored = self
            .records
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        Ok(stored.len())
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }
}
