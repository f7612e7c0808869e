//! Text generation provider trait.
//!
//! Concrete providers (Gemini, OpenAI, Ollama) live in the `query-harness`
//! app crate. Pipelines only see this trait, which keeps them testable
//! with deterministic stubs.
//!
//! Besides single prompts, a provider may accept images alongside the
//! prompt ([`GenerationProvider::generate_with_images`]) and multi-turn
//! conversations ([`GenerationProvider::chat`]). Both have default
//! implementations for text-only providers.

use std::fmt;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling options passed with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// An image sent inline with a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    /// e.g. `image/png`
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePart {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => f.write_str("user"),
            ChatRole::Assistant => f.write_str("assistant"),
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Render turns as a plain transcript ending with an open assistant line.
pub fn render_transcript(turns: &[ChatTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let speaker = match turn.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&turn.content);
        out.push('\n');
    }
    out.push_str("Assistant:");
    out
}

/// A hosted (or local) large-language-model endpoint.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;
    /// Generate a completion for a single prompt. No streaming, no retries.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Generate from a prompt plus inline images.
    ///
    /// Providers without vision input reject any non-empty `images`.
    async fn generate_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
        options: &GenerationOptions,
    ) -> Result<String> {
        if images.is_empty() {
            return self.generate(prompt, options).await;
        }
        bail!("model {} does not accept image input", self.model_name())
    }

    /// Reply to the last user turn given the whole conversation.
    ///
    /// The default flattens the turns into one transcript prompt.
    async fn chat(&self, turns: &[ChatTurn], options: &GenerationOptions) -> Result<String> {
        self.generate(&render_transcript(turns), options).await
    }
}
