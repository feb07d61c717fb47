//! Vector store gateways for ragline
//!
//! This crate provides the Qdrant-backed implementation of the
//! `VectorStoreGateway` trait, plus an in-memory store used for local runs
//! and tests.

mod config;
mod memory;
mod qdrant;


pub use config::QdrantConfig;
pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantGateway;

// Re-export core types for convenience
pub use ragline_core::{
    EmbeddingVector, Error, InsertReport, Result, SearchHit, StoredRecord, VectorStoreGateway,
};
