//! Error types shared across LeaseKB crates.

use std::path::PathBuf;

/// Result alias used by every LeaseKB library crate.
pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// Vector/text counts or vector widths disagree.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Index {index} out of range (store holds {len} records)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Vector store file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corrupt vector store data: {0}")]
    CorruptData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding, completion, or record-source failure.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("Unknown corpus: {0}")]
    UnknownCorpus(String),
}

impl KbError {
    /// Whether the error came from an external collaborator rather than local state.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            KbError::Upstream(_) | KbError::Http(_) | KbError::ApiKeyMissing(_)
        )
    }
}
