//! Error types for ragline

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the ingestion and retrieval pipelines
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Message stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], used by the ingestion supervisor to
/// decide between retrying, restarting and halting, and by the HTTP layer to
/// pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Parse,
    Integrity,
    Upstream,
    ServiceUnavailable,
    Configuration,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Parse(_) | Error::Serialization(_) => ErrorKind::Parse,
            Error::Integrity(_) => ErrorKind::Integrity,
            Error::Upstream(_) | Error::Completion(_) => ErrorKind::Upstream,
            Error::ServiceUnavailable(_)
            | Error::EmbeddingService(_)
            | Error::VectorStore(_)
            | Error::Stream(_)
            | Error::Io(_) => ErrorKind::ServiceUnavailable,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Only connectivity failures qualify. A service that answered with an
    /// error status is not retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ServiceUnavailable(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}
