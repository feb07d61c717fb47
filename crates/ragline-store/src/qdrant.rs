//! Qdrant gateway implementation

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointId, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpdateStatus, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use tracing::{debug, info};
use uuid::Uuid;

use ragline_core::{
    ConnectionPool, EMBEDDING_DIM, EmbeddingVector, Error, InsertReport, MAX_STORED_TEXT_LEN,
    PoolConfig, Result, SearchHit, StoredRecord, VectorStoreGateway,
};

use crate::config::QdrantConfig;

const TEXT_FIELD: &str = "text";
const TIMESTAMP_FIELD: &str = "timestamp_unix";

/// gRPC status codes that mean the server could not be reached in time.
const GRPC_DEADLINE_EXCEEDED: i32 = 4;
const GRPC_UNAVAILABLE: i32 = 14;

/// Qdrant-backed vector store gateway
pub struct QdrantGateway {
    config: QdrantConfig,
    pool: ConnectionPool<Qdrant>,
}

impl QdrantGateway {
    /// Create a gateway holding `pool.size` client connections
    pub fn new(config: QdrantConfig, pool: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let pool = ConnectionPool::build(pool, |_| {
            Qdrant::from_url(&config.url)
                .api_key(config.api_key.clone())
                .timeout(config.timeout())
                .build()
                .map_err(|e| Error::Configuration(format!("failed to build Qdrant client: {}", e)))
        })?;
        Ok(Self { config, pool })
    }

    /// Create a gateway from environment variables
    pub fn from_env(pool: &PoolConfig) -> Result<Self> {
        let config = QdrantConfig::from_env()?;
        Self::new(config, pool)
    }

    fn to_point(record: StoredRecord) -> Result<(u64, PointStruct)> {
        if record.text.chars().count() > MAX_STORED_TEXT_LEN {
            return Err(Error::InvalidArgument(format!(
                "stored text exceeds {} characters",
                MAX_STORED_TEXT_LEN
            )));
        }
        let id = Uuid::new_v4().as_u64_pair().0;
        let mut payload = Payload::new();
        payload.insert(TEXT_FIELD, record.text);
        payload.insert(TIMESTAMP_FIELD, record.timestamp_unix);
        Ok((id, PointStruct::new(id, record.embedding.into_values(), payload)))
    }
}

/// Unreachable or timed-out servers are transient; anything else the server
/// said is a store error.
fn store_error(context: &str, err: QdrantError) -> Error {
    match &err {
        QdrantError::ResponseError { status, .. } => {
            let code = i32::from(status.code());
            if code == GRPC_UNAVAILABLE || code == GRPC_DEADLINE_EXCEEDED {
                Error::ServiceUnavailable(format!("{}: {}", context, err))
            } else {
                Error::VectorStore(format!("{}: {}", context, err))
            }
        }
        QdrantError::Io(_) => Error::ServiceUnavailable(format!("{}: {}", context, err)),
        _ => Error::VectorStore(format!("{}: {}", context, err)),
    }
}

fn point_id(id: Option<&PointId>) -> Option<u64> {
    match id?.point_id_options.as_ref()? {
        PointIdOptions::Num(num) => Some(*num),
        PointIdOptions::Uuid(_) => None,
    }
}

fn payload_text(value: Option<&Value>) -> Option<&str> {
    match value?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.as_str()),
        _ => None,
    }
}

pub(crate) fn hit_from_point(point: &ScoredPoint) -> Result<SearchHit> {
    let id = point_id(point.id.as_ref())
        .ok_or_else(|| Error::VectorStore("search hit without a numeric id".to_string()))?;
    let text = payload_text(point.payload.get(TEXT_FIELD))
        .ok_or_else(|| Error::VectorStore(format!("search hit {} has no text payload", id)))?;
    Ok(SearchHit {
        id,
        distance: point.score,
        text: text.to_string(),
    })
}

#[async_trait]
impl VectorStoreGateway for QdrantGateway {
    async fn ensure_collection(&self) -> Result<()> {
        let client = self.pool.acquire().await?;
        let name = &self.config.collection;

        let exists = client
            .collection_exists(name.as_str())
            .await
            .map_err(|e| store_error("collection lookup failed", e))?;
        if exists {
            debug!(collection = %name, "collection already exists");
            return Ok(());
        }

        client
            .create_collection(
                CreateCollectionBuilder::new(name.as_str())
                    .vectors_config(VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| store_error("collection creation failed", e))?;
        info!(collection = %name, dim = EMBEDDING_DIM, "created collection");
        Ok(())
    }

    async fn insert(&self, records: Vec<StoredRecord>) -> Result<InsertReport> {
        if records.is_empty() {
            return Ok(InsertReport::default());
        }

        let (ids, points): (Vec<u64>, Vec<PointStruct>) = records
            .into_iter()
            .map(Self::to_point)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();

        let client = self.pool.acquire().await?;
        let response = client
            .upsert_points(UpsertPointsBuilder::new(self.config.collection.as_str(), points).wait(true))
            .await
            .map_err(|e| store_error("upsert failed", e))?;

        let completed = response
            .result
            .map(|result| result.status == UpdateStatus::Completed as i32)
            .unwrap_or(false);
        if !completed {
            // nothing is known to be durable
            return Ok(InsertReport::default());
        }

        Ok(InsertReport {
            inserted_count: ids.len(),
            ids,
        })
    }

    async fn search(&self, vector: &EmbeddingVector, top_k: usize) -> Result<Vec<SearchHit>> {
        let client = self.pool.acquire().await?;
        let response = client
            .search_points(
                SearchPointsBuilder::new(
                    self.config.collection.as_str(),
                    vector.values().to_vec(),
                    top_k as u64,
                )
                .with_payload(true),
            )
            .await
            .map_err(|e| store_error("search failed", e))?;

        response.result.iter().map(hit_from_point).collect()
    }

    async fn count(&self) -> Result<usize> {
        let client = self.pool.acquire().await?;
        let response = client
            .count(CountPointsBuilder::new(self.config.collection.as_str()).exact(true))
            .await
            .map_err(|e| store_error("count failed", e))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn collection_name(&self) -> &str {
        &self.config.collection
    }
}
