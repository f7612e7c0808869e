//! Vector index storage abstraction.
//!
//! The [`IndexStore`] trait is the seam between the pipelines and whatever
//! persists (chunk, vector) pairs. Writes are two-phase: a build is first
//! staged under a fresh build id, which is invisible to readers, and then
//! promoted to its index name. Promotion replaces the previous build in one
//! step, so a reader sees either the old index or the new one, never a mix.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// One (chunk, vector) pair to be written to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub vector: Vec<f32>,
}

/// Metadata describing the live build of a named index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexManifest {
    pub name: String,
    /// UUID of the build currently served under `name`.
    pub build_id: String,
    /// Embedding model used to build the index.
    pub model: String,
    pub dims: usize,
    pub chunk_count: usize,
    /// Unix timestamp (seconds) of promotion.
    pub created_at: i64,
}

/// An index entry returned from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub chunk_index: usize,
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f64,
}

/// Abstract storage backend for vector indexes.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`stage_entries`](IndexStore::stage_entries) | Write entries under an unpublished build id |
/// | [`promote`](IndexStore::promote) | Publish a staged build under its index name |
/// | [`discard_staged`](IndexStore::discard_staged) | Remove a staged build that will not be promoted |
/// | [`manifest`](IndexStore::manifest) | Look up the live build of an index |
/// | [`list_indexes`](IndexStore::list_indexes) | All live indexes |
/// | [`nearest`](IndexStore::nearest) | Top-k cosine search within one build |
/// | [`drop_index`](IndexStore::drop_index) | Delete an index and its entries |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Write entries for `build_id`. May be called more than once per build.
    async fn stage_entries(&self, build_id: &str, entries: &[IndexEntry]) -> Result<()>;

    /// Make `manifest.build_id` the live build for `manifest.name` and delete
    /// the entries of the build it replaces. Must be all-or-nothing.
    async fn promote(&self, manifest: &IndexManifest) -> Result<()>;

    /// Delete every entry staged under `build_id`.
    async fn discard_staged(&self, build_id: &str) -> Result<()>;

    async fn manifest(&self, name: &str) -> Result<Option<IndexManifest>>;

    async fn list_indexes(&self) -> Result<Vec<IndexManifest>>;

    /// Return up to `k` entries of `build_id`, best match first. Ties are
    /// broken by ascending chunk index.
    async fn nearest(&self, build_id: &str, query_vec: &[f32], k: usize)
        -> Result<Vec<ScoredEntry>>;

    /// Returns `true` if an index was removed.
    async fn drop_index(&self, name: &str) -> Result<bool>;
}

/// Sort scored entries best-first and keep `k`.
pub fn rank_top_k(mut entries: Vec<ScoredEntry>, k: usize) -> Vec<ScoredEntry> {
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    entries.truncate(k);
    entries
}
