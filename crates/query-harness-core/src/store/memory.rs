//! In-memory [`IndexStore`] implementation for tests and embedding callers
//! that do not need persistence.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over the entries of one build.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{rank_top_k, IndexEntry, IndexManifest, IndexStore, ScoredEntry};

/// In-memory index store.
#[derive(Default)]
pub struct InMemoryIndexStore {
    builds: RwLock<HashMap<String, Vec<IndexEntry>>>,
    manifests: RwLock<HashMap<String, IndexManifest>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of builds holding entries, staged or live.
    pub fn build_count(&self) -> usize {
        self.builds.read().map(|b| b.len()).unwrap_or(0)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| anyhow::anyhow!("in-memory index lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| anyhow::anyhow!("in-memory index lock poisoned"))
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn stage_entries(&self, build_id: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut builds = write(&self.builds)?;
        builds
            .entry(build_id.to_string())
            .or_default()
            .extend(entries.iter().cloned());
        Ok(())
    }

    async fn promote(&self, manifest: &IndexManifest) -> Result<()> {
        let mut builds = write(&self.builds)?;
        let mut manifests = write(&self.manifests)?;
        if !builds.contains_key(&manifest.build_id) && manifest.chunk_count > 0 {
            anyhow::bail!("build {} has no staged entries", manifest.build_id);
        }
        if let Some(previous) = manifests.insert(manifest.name.clone(), manifest.clone()) {
            if previous.build_id != manifest.build_id {
                builds.remove(&previous.build_id);
            }
        }
        Ok(())
    }

    async fn discard_staged(&self, build_id: &str) -> Result<()> {
        write(&self.builds)?.remove(build_id);
        Ok(())
    }

    async fn manifest(&self, name: &str) -> Result<Option<IndexManifest>> {
        Ok(read(&self.manifests)?.get(name).cloned())
    }

    async fn list_indexes(&self) -> Result<Vec<IndexManifest>> {
        let mut all: Vec<IndexManifest> = read(&self.manifests)?.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn nearest(
        &self,
        build_id: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let builds = read(&self.builds)?;
        let scored = builds
            .get(build_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| ScoredEntry {
                        chunk_index: e.chunk_index,
                        text: e.text.clone(),
                        score: cosine_similarity(query_vec, &e.vector) as f64,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rank_top_k(scored, k))
    }

    async fn drop_index(&self, name: &str) -> Result<bool> {
        // lock order: builds before manifests, as in promote
        let mut builds = write(&self.builds)?;
        let mut manifests = write(&self.manifests)?;
        match manifests.remove(name) {
            Some(m) => {
                builds.remove(&m.build_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
