//! Ollama integration for ragline
//!
//! This crate provides the Ollama implementation of the `EmbeddingClient` and
//! `CompletionClient` traits.

mod client;
mod config;


pub use client::OllamaClient;
pub use config::OllamaConfig;

// Re-export core types for convenience
pub use ragline_core::{ChatCompletion, CompletionClient, EmbeddingClient, Error, Result};
