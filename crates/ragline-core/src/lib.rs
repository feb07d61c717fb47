//! Core traits and types for ragline
//!
//! This crate defines the data model shared by the ingestion and retrieval
//! pipelines, the capability-facing interfaces for the embedding service, the
//! vector store, the completion model and the message stream, and the pure
//! text chunker. Concrete clients live in their own crates so the pipelines
//! can be exercised against in-process fakes.

pub mod chunker;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod pool;
pub mod retry;
pub mod stream;
pub mod types;
pub mod vector_store;

pub use chunker::{Chunker, DEFAULT_CHUNK_LIMIT, split_into_chunks};
pub use completion::{ChatCompletion, CompletionClient};
pub use config::{PipelineConfig, PoolConfig, env_opt, env_or, env_parse, env_parse_opt};
pub use embedding::EmbeddingClient;
pub use error::{Error, ErrorKind, Result};
pub use pool::{ConnectionPool, PooledConnection};
pub use retry::RetryPolicy;
pub use stream::{MessageStream, StreamCoordinates, StreamMessage};
pub use types::*;
pub use vector_store::VectorStoreGateway;
