//! Ingestion and retrieval pipelines for ragline
//!
//! Both pipelines depend only on the capability traits in `ragline-core`;
//! concrete clients are injected as `Arc` handles at startup.

mod ingestion;
mod prompt;
mod retrieval;

#[cfg(test)]
mod tests;

pub use ingestion::{IngestReport, IngestionPipeline, IngestionState, RunSummary, StopReason};
pub use prompt::PromptTemplate;
pub use retrieval::RetrievalPipeline;

// Re-export core types for convenience
pub use ragline_core::{Error, ErrorKind, PipelineConfig, Result, RetrievalContext};
