//! # Query Harness Core
//!
//! Pipelines for question answering over documents and for turning
//! questions into SQL, written against small collaborator traits:
//!
//! | Seam | Trait |
//! |------|-------|
//! | Embeddings | [`embedding::EmbeddingProvider`] |
//! | Text generation | [`generation::GenerationProvider`] |
//! | Vector storage | [`store::IndexStore`] |
//! | Text extraction | [`models::TextExtractor`] |
//!
//! Pipelines return [`Error`]; collaborators return `anyhow::Result` and
//! are re-signalled at the pipeline boundary.
//!
//! This crate has no tokio runtime, sqlx, HTTP, or filesystem I/O. Concrete
//! providers and the SQLite store live in the `query-harness` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod qa;
pub mod sql;
pub mod store;
pub mod tasks;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
