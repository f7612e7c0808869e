//! Deterministic in-process providers for tests.
//!
//! None of these call the network. [`HashEmbedder`] maps each lowercase word
//! to a bucket so texts that share words land close together, which is
//! enough to make retrieval order predictable in tests.

use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::generation::{GenerationOptions, GenerationProvider, ImagePart};

/// Bag-of-words embedder with a fixed number of buckets.
pub struct HashEmbedder {
    model: String,
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            model: format!("hash-{}", dims),
            dims,
        }
    }

    pub fn with_model(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return v;
        }
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            // FNV-1a
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embedder that always fails, as an unreachable endpoint would.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}

/// Embedder that claims one dimension and returns another.
pub struct WrongDimsEmbedder;

#[async_trait]
impl EmbeddingProvider for WrongDimsEmbedder {
    fn model_name(&self) -> &str {
        "wrong-dims"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
    }
}

/// Generator that returns a fixed reply and records every prompt it saw.
///
/// Accepts images; the media types sent with each prompt are recorded too
/// (an empty list for text-only calls).
pub struct FixedGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
    images: Mutex<Vec<Vec<String>>>,
}

impl FixedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Media types of the images sent with each prompt, in call order.
    pub fn image_types(&self) -> Vec<Vec<String>> {
        self.images.lock().map(|i| i.clone()).unwrap_or_default()
    }

    fn record(&self, prompt: &str, images: &[ImagePart]) {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        if let Ok(mut i) = self.images.lock() {
            i.push(images.iter().map(|img| img.media_type.clone()).collect());
        }
    }
}

#[async_trait]
impl GenerationProvider for FixedGenerator {
    fn model_name(&self) -> &str {
        "fixed"
    }
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.record(prompt, &[]);
        Ok(self.reply.clone())
    }
    async fn generate_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
        _options: &GenerationOptions,
    ) -> Result<String> {
        self.record(prompt, images);
        Ok(self.reply.clone())
    }
}

/// Generator that answers from the prompt's context section.
///
/// If the text between `context_marker` and `question_marker` mentions
/// `term` (case-insensitive), replies with `answer`; otherwise with
/// `fallback`.
pub struct ContextualGenerator {
    pub term: String,
    pub answer: String,
    pub fallback: String,
    pub context_marker: String,
    pub question_marker: String,
}

#[async_trait]
impl GenerationProvider for ContextualGenerator {
    fn model_name(&self) -> &str {
        "contextual"
    }
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        let start = prompt
            .find(&self.context_marker)
            .map(|i| i + self.context_marker.len())
            .unwrap_or(0);
        let end = prompt[start..]
            .find(&self.question_marker)
            .map(|i| start + i)
            .unwrap_or(prompt.len());
        let context = prompt[start..end].to_lowercase();
        if context.contains(&self.term.to_lowercase()) {
            Ok(self.answer.clone())
        } else {
            Ok(self.fallback.clone())
        }
    }
}

/// Generator that always fails, as a quota or network error would.
pub struct FailingGenerator;

#[async_trait]
impl GenerationProvider for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        bail!("quota exceeded")
    }
}
