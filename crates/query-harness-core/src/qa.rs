//! Retrieval QA: embed question → top-k search → prompt → generate.
//!
//! The index is named explicitly on every call. The prompt instructs the
//! model to answer only from the retrieved chunks and to reply with
//! [`NOT_AVAILABLE`] when they do not contain the answer.

use serde::Serialize;
use tracing::debug;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{describe, Error, Result};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::prompt::PromptTemplate;
use crate::store::{IndexManifest, IndexStore, ScoredEntry};

/// Reply the model is told to give when the context lacks the answer.
pub const NOT_AVAILABLE: &str = "answer not available in context";

pub const DEFAULT_TOP_K: usize = 4;

pub const QA_TEMPERATURE: f32 = 0.3;

/// Marker preceding the retrieved chunks in the QA prompt.
pub const CONTEXT_MARKER: &str = "Context:\n";

/// Marker preceding the user's question in the QA prompt.
pub const QUESTION_MARKER: &str = "Question:\n";

const QA_TEMPLATE: &str = "Answer the question as thoroughly as possible using only the \
provided context. Do not use outside knowledge. If the answer is not contained in the \
context, reply exactly \"{fallback}\" and nothing else.\n\n\
Context:\n{context}\n\n\
Question:\n{question}\n\n\
Answer:";

/// Separator between retrieved chunks inside the prompt.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// An answer plus the chunks it was generated from, best match first.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub index: String,
    pub sources: Vec<ScoredEntry>,
}

/// Answers questions against named indexes.
pub struct RetrievalQa<'a> {
    pub store: &'a dyn IndexStore,
    pub embedder: &'a dyn EmbeddingProvider,
    pub generator: &'a dyn GenerationProvider,
    pub options: GenerationOptions,
}

impl<'a> RetrievalQa<'a> {
    pub fn new(
        store: &'a dyn IndexStore,
        embedder: &'a dyn EmbeddingProvider,
        generator: &'a dyn GenerationProvider,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            options: GenerationOptions::with_temperature(QA_TEMPERATURE),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Look up the live manifest and check it matches the current embedder.
    async fn live_manifest(&self, index_name: &str) -> Result<IndexManifest> {
        let manifest = self
            .store
            .manifest(index_name)
            .await
            .map_err(|e| Error::Storage(describe(&e)))?
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;

        if manifest.model != self.embedder.model_name() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} ({} dims)", manifest.model, manifest.dims),
                actual: format!(
                    "{} ({} dims)",
                    self.embedder.model_name(),
                    self.embedder.dims()
                ),
            });
        }
        if self.embedder.dims() != 0 && self.embedder.dims() != manifest.dims {
            return Err(Error::DimensionMismatch {
                expected: manifest.dims.to_string(),
                actual: self.embedder.dims().to_string(),
            });
        }
        Ok(manifest)
    }

    /// Return the `top_k` chunks of `index_name` most similar to `question`.
    pub async fn retrieve(
        &self,
        question: &str,
        index_name: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        if top_k == 0 {
            return Err(Error::InvalidConfiguration(
                "top_k must be > 0".to_string(),
            ));
        }
        let manifest = self.live_manifest(index_name).await?;

        let query_vec = embed_query(self.embedder, question)
            .await
            .map_err(|e| Error::Embedding(describe(&e)))?;
        if query_vec.len() != manifest.dims {
            return Err(Error::DimensionMismatch {
                expected: manifest.dims.to_string(),
                actual: query_vec.len().to_string(),
            });
        }

        let hits = self
            .store
            .nearest(&manifest.build_id, &query_vec, top_k)
            .await
            .map_err(|e| Error::Storage(describe(&e)))?;
        debug!(index = index_name, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }

    /// Answer `question` from `index_name`, returning the model's text verbatim.
    pub async fn answer(&self, question: &str, index_name: &str, top_k: usize) -> Result<String> {
        Ok(self
            .answer_with_sources(question, index_name, top_k)
            .await?
            .answer)
    }

    pub async fn answer_with_sources(
        &self,
        question: &str,
        index_name: &str,
        top_k: usize,
    ) -> Result<Answer> {
        let sources = self.retrieve(question, index_name, top_k).await?;
        let prompt = build_qa_prompt(question, &sources)?;
        let answer = self
            .generator
            .generate(&prompt, &self.options)
            .await
            .map_err(|e| Error::Generation(describe(&e)))?;
        Ok(Answer {
            answer,
            index: index_name.to_string(),
            sources,
        })
    }
}

/// Render the QA prompt for `question` over `chunks` in rank order.
pub fn build_qa_prompt(question: &str, chunks: &[ScoredEntry]) -> Result<String> {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);
    let template = PromptTemplate::parse(QA_TEMPLATE)
        .map_err(|e| Error::Generation(format!("bad QA template: {}", e)))?;
    template
        .render(&[
            ("fallback", NOT_AVAILABLE),
            ("context", &context),
            ("question", question),
        ])
        .map_err(|e| Error::Generation(format!("bad QA template: {}", e)))
}
