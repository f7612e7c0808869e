//! Error taxonomy shared by every pipeline.
//!
//! Collaborators (embedding and generation providers, index stores,
//! text extractors) report failures as [`anyhow::Error`]. Pipelines catch
//! those at their boundary and re-signal them as one of the [`Error`]
//! kinds below, keeping the collaborator message for diagnostics.

use thiserror::Error;

/// A pipeline-level failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad chunking or retrieval parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding client failed or returned unusable vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Building or persisting an index failed.
    #[error("indexing failed: {0}")]
    Indexing(String),

    /// No index has been built under this name.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// The query embedding does not match the index it is searched against.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// The generation client failed (timeout, quota, network, auth).
    #[error("generation failed: {0}")]
    Generation(String),

    /// NL-to-SQL translation failed.
    #[error("translation failed: {0}")]
    Translation(String),

    /// The SQL statement could not be executed.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The index store could not be read while answering.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Short machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "invalid_configuration",
            Error::Embedding(_) => "embedding_error",
            Error::Indexing(_) => "indexing_error",
            Error::IndexNotFound(_) => "index_not_found",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::Generation(_) => "generation_error",
            Error::Translation(_) => "translation_error",
            Error::Execution(_) => "execution_error",
            Error::Storage(_) => "storage_error",
        }
    }
}

/// Render a collaborator error with its full context chain.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

pub type Result<T> = std::result::Result<T, Error>;
