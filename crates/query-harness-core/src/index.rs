//! Indexing pipeline: extract → chunk → embed → stage → promote.
//!
//! All-or-nothing: entries are written under a fresh build id and only
//! published under the index name once every chunk has been embedded and
//! staged. Any failure discards the staged build and leaves the previous
//! index of the same name untouched.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{chunk_with, Chunk, ChunkParams};
use crate::embedding::EmbeddingProvider;
use crate::error::{describe, Error, Result};
use crate::models::{Document, TextExtractor};
use crate::store::{IndexEntry, IndexManifest, IndexStore};

/// Handle to a successfully built index.
pub type IndexHandle = IndexManifest;

/// Separator placed between the texts of consecutive documents.
const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Default number of chunks sent per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Builds named indexes from documents.
pub struct Indexer<'a> {
    pub store: &'a dyn IndexStore,
    pub embedder: &'a dyn EmbeddingProvider,
    pub extractor: &'a dyn TextExtractor,
    pub params: ChunkParams,
    pub batch_size: usize,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a dyn IndexStore,
        embedder: &'a dyn EmbeddingProvider,
        extractor: &'a dyn TextExtractor,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            params: ChunkParams::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_params(mut self, params: ChunkParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Extract the text of every document, in input order.
    pub fn extract_all(&self, documents: &[Document]) -> Result<String> {
        let mut texts = Vec::with_capacity(documents.len());
        for doc in documents {
            let text = self.extractor.extract(doc).map_err(|e| {
                Error::Indexing(format!("text extraction failed for {}: {}", doc.name, describe(&e)))
            })?;
            debug!(document = %doc.name, chars = text.chars().count(), "extracted text");
            texts.push(text);
        }
        Ok(texts.join(DOCUMENT_SEPARATOR))
    }

    /// Build (or rebuild) `index_name` from `documents`.
    pub async fn build_index(&self, documents: &[Document], index_name: &str) -> Result<IndexHandle> {
        if index_name.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "index name must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding batch size must be > 0".to_string(),
            ));
        }
        self.params.validate()?;

        let text = self.extract_all(documents)?;
        if text.trim().is_empty() {
            return Err(Error::Indexing("no text to index".to_string()));
        }

        self.build_from_text(&text, index_name).await
    }

    /// Build `index_name` from already extracted text.
    pub async fn build_from_text(&self, text: &str, index_name: &str) -> Result<IndexHandle> {
        let build_id = Uuid::new_v4().to_string();
        info!(index = index_name, build = %build_id, "building index");

        match self.stage_all(text, &build_id).await {
            Ok((chunk_count, dims)) => {
                let manifest = IndexManifest {
                    name: index_name.to_string(),
                    build_id: build_id.clone(),
                    model: self.embedder.model_name().to_string(),
                    dims,
                    chunk_count,
                    created_at: Utc::now().timestamp(),
                };
                if let Err(e) = self.store.promote(&manifest).await {
                    self.discard(&build_id).await;
                    return Err(Error::Indexing(format!(
                        "failed to publish index {}: {}",
                        index_name,
                        describe(&e)
                    )));
                }
                info!(index = index_name, chunks = chunk_count, dims, "index published");
                Ok(manifest)
            }
            Err(e) => {
                self.discard(&build_id).await;
                Err(e)
            }
        }
    }

    async fn stage_all(&self, text: &str, build_id: &str) -> Result<(usize, usize)> {
        let mut expected_dims = match self.embedder.dims() {
            0 => None,
            d => Some(d),
        };
        let mut total = 0usize;
        let mut batch: Vec<Chunk> = Vec::with_capacity(self.batch_size);

        for chunk in chunk_with(text, self.params)? {
            batch.push(chunk);
            if batch.len() == self.batch_size {
                total += self.stage_batch(&batch, build_id, &mut expected_dims).await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            total += self.stage_batch(&batch, build_id, &mut expected_dims).await?;
        }

        Ok((total, expected_dims.unwrap_or(0)))
    }

    async fn stage_batch(
        &self,
        batch: &[Chunk],
        build_id: &str,
        expected_dims: &mut Option<usize>,
    ) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(|e| Error::Embedding(describe(&e)))?;

        if vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        let mut entries = Vec::with_capacity(batch.len());
        for (chunk, vector) in batch.iter().zip(vectors) {
            let dims = *expected_dims.get_or_insert(vector.len());
            if vector.len() != dims {
                return Err(Error::Embedding(format!(
                    "embedding dimension mismatch at chunk {}: expected {}, got {}",
                    chunk.index,
                    dims,
                    vector.len()
                )));
            }
            entries.push(IndexEntry {
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                hash: chunk.hash.clone(),
                vector,
            });
        }

        self.store
            .stage_entries(build_id, &entries)
            .await
            .map_err(|e| Error::Indexing(describe(&e)))?;
        debug!(build = build_id, staged = entries.len(), "staged batch");
        Ok(entries.len())
    }

    async fn discard(&self, build_id: &str) {
        if let Err(e) = self.store.discard_staged(build_id).await {
            warn!(build = build_id, "failed to discard staged build: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlainTextExtractor;
    use crate::store::memory::InMemoryIndexStore;
    use crate::store::ScoredEntry;
    use crate::testing::{FailingEmbedder, HashEmbedder, WrongDimsEmbedder};
    use async_trait::async_trait;

    fn small_params() -> ChunkParams {
        ChunkParams::new(40, 5).unwrap()
    }

    #[tokio::test]
    async fn test_build_index_publishes_manifest() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(16);
        let indexer =
            Indexer::new(&store, &embedder, &PlainTextExtractor).with_params(small_params());

        let docs = vec![Document::plain_text(
            "a.txt",
            &"Rust ownership and borrowing rules. ".repeat(5),
        )];
        let handle = indexer.build_index(&docs, "notes").await.unwrap();

        assert_eq!(handle.name, "notes");
        assert_eq!(handle.dims, 16);
        assert_eq!(handle.model, "hash-16");
        assert!(handle.chunk_count > 1);
        assert_eq!(store.manifest("notes").await.unwrap(), Some(handle));
    }

    #[tokio::test]
    async fn test_documents_concatenate_in_order() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(8);
        let indexer = Indexer::new(&store, &embedder, &PlainTextExtractor);
        let docs = vec![
            Document::plain_text("1", "first"),
            Document::plain_text("2", "second"),
        ];
        assert_eq!(indexer.extract_all(&docs).unwrap(), "first\n\nsecond");
    }

    #[tokio::test]
    async fn test_small_batches_cover_every_chunk() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(8);
        let indexer = Indexer::new(&store, &embedder, &PlainTextExtractor)
            .with_params(ChunkParams::new(10, 2).unwrap())
            .with_batch_size(3);
        let text = "abcdefghijklmnopqrstuvwxyz".repeat(3);
        let handle = indexer
            .build_index(&[Document::plain_text("x", &text)], "abc")
            .await
            .unwrap();
        let expected = chunk_with(&text, indexer.params).unwrap().count();
        assert_eq!(handle.chunk_count, expected);
        let all = store
            .nearest(&handle.build_id, &[1.0; 8], usize::MAX)
            .await
            .unwrap();
        assert_eq!(all.len(), expected);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_build() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(32);
        let indexer =
            Indexer::new(&store, &embedder, &PlainTextExtractor).with_params(small_params());

        let a = indexer
            .build_index(&[Document::plain_text("a", "apples grow on trees")], "kb")
            .await
            .unwrap();
        let b = indexer
            .build_index(&[Document::plain_text("b", "bananas are yellow")], "kb")
            .await
            .unwrap();
        assert_ne!(a.build_id, b.build_id);
        assert_eq!(store.build_count(), 1);

        let q = embedder.embed_texts(&["apples".to_string()]).await.unwrap();
        let hits: Vec<ScoredEntry> = store.nearest(&b.build_id, &q[0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.text.contains("bananas")));
        assert!(store.nearest(&a.build_id, &q[0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_documents_fail() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(8);
        let indexer = Indexer::new(&store, &embedder, &PlainTextExtractor);
        let err = indexer
            .build_index(&[Document::plain_text("e", "   ")], "kb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Indexing(_)));
    }

    #[tokio::test]
    async fn test_unsupported_media_type_is_indexing_error() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(8);
        let indexer = Indexer::new(&store, &embedder, &PlainTextExtractor);
        let doc = Document::new("img.png", "image/png", vec![0, 1, 2]);
        let err = indexer.build_index(&[doc], "kb").await.unwrap_err();
        assert!(matches!(err, Error::Indexing(msg) if msg.contains("img.png")));
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_previous_index() {
        let store = InMemoryIndexStore::new();
        let good = HashEmbedder::new(8);
        let first = Indexer::new(&store, &good, &PlainTextExtractor)
            .build_index(&[Document::plain_text("a", "original text")], "kb")
            .await
            .unwrap();

        let err = Indexer::new(&store, &FailingEmbedder, &PlainTextExtractor)
            .build_index(&[Document::plain_text("b", "replacement")], "kb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(msg) if msg.contains("connection refused")));
        assert_eq!(store.manifest("kb").await.unwrap(), Some(first));
        assert_eq!(store.build_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_embedding_error() {
        let store = InMemoryIndexStore::new();
        let err = Indexer::new(&store, &WrongDimsEmbedder, &PlainTextExtractor)
            .build_index(&[Document::plain_text("a", "text")], "kb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(msg) if msg.contains("dimension")));
        assert!(store.manifest("kb").await.unwrap().is_none());
    }

    /// Stages normally but refuses to publish.
    struct UnpublishableStore(InMemoryIndexStore);

    #[async_trait]
    impl IndexStore for UnpublishableStore {
        async fn stage_entries(&self, build_id: &str, entries: &[IndexEntry]) -> anyhow::Result<()> {
            self.0.stage_entries(build_id, entries).await
        }
        async fn promote(&self, _manifest: &IndexManifest) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn discard_staged(&self, build_id: &str) -> anyhow::Result<()> {
            self.0.discard_staged(build_id).await
        }
        async fn manifest(&self, name: &str) -> anyhow::Result<Option<IndexManifest>> {
            self.0.manifest(name).await
        }
        async fn list_indexes(&self) -> anyhow::Result<Vec<IndexManifest>> {
            self.0.list_indexes().await
        }
        async fn nearest(
            &self,
            build_id: &str,
            query_vec: &[f32],
            k: usize,
        ) -> anyhow::Result<Vec<ScoredEntry>> {
            self.0.nearest(build_id, query_vec, k).await
        }
        async fn drop_index(&self, name: &str) -> anyhow::Result<bool> {
            self.0.drop_index(name).await
        }
    }

    #[tokio::test]
    async fn test_failed_promotion_discards_staged_entries() {
        let store = UnpublishableStore(InMemoryIndexStore::new());
        let embedder = HashEmbedder::new(8);
        let err = Indexer::new(&store, &embedder, &PlainTextExtractor)
            .build_index(&[Document::plain_text("a", "some text")], "kb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Indexing(msg) if msg.contains("disk full")));
        assert_eq!(store.0.build_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let store = InMemoryIndexStore::new();
        let embedder = HashEmbedder::new(8);
        let mut indexer = Indexer::new(&store, &embedder, &PlainTextExtractor);
        indexer.params = ChunkParams {
            size: 10,
            overlap: 10,
        };
        let err = indexer
            .build_index(&[Document::plain_text("a", "text")], "kb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
