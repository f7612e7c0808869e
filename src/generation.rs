//! Text generation provider implementations.
//!
//! - **[`DisabledGenerator`]**: returns errors; used when generation is not configured.
//! - **[`GeminiGenerator`]**: `models/{model}:generateContent`. Requires `GOOGLE_API_KEY`.
//! - **[`OpenAIGenerator`]**: chat completions. Requires `OPENAI_API_KEY`.
//! - **[`OllamaGenerator`]**: `/api/generate` with streaming off.
//!
//! One request per call. Timeouts come from `generation.timeout_secs`.
//! All three send images inline as base64 and send chat turns as the
//! provider's native message list.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use query_harness_core::generation::{
    ChatRole, ChatTurn, GenerationOptions, GenerationProvider, ImagePart,
};

use crate::config::GenerationConfig;
use crate::embedding::{api_key, gemini_model_path, http_client, send_json};

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn required_model(config: &GenerationConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("generation.model required for {} provider", provider))
}

const DISABLED_MESSAGE: &str =
    "Generation provider is disabled; set [generation] provider in the config";

/// Generator that always fails.
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        bail!(DISABLED_MESSAGE)
    }

    async fn generate_with_images(
        &self,
        _prompt: &str,
        _images: &[ImagePart],
        _options: &GenerationOptions,
    ) -> Result<String> {
        bail!(DISABLED_MESSAGE)
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Gemini")?,
            url: config.url.clone().unwrap_or_else(|| GEMINI_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn gemini_image_part(image: &ImagePart) -> serde_json::Value {
    serde_json::json!({
        "inline_data": { "mime_type": image.media_type, "data": STANDARD.encode(&image.bytes) }
    })
}

fn gemini_body(contents: serde_json::Value, options: &GenerationOptions) -> serde_json::Value {
    let mut generation_config = serde_json::json!({ "temperature": options.temperature });
    if let Some(max) = options.max_tokens {
        generation_config["maxOutputTokens"] = serde_json::json!(max);
    }
    serde_json::json!({
        "contents": contents,
        "generationConfig": generation_config,
    })
}

/// Single user message: the prompt text followed by any images.
fn gemini_request(
    prompt: &str,
    images: &[ImagePart],
    options: &GenerationOptions,
) -> serde_json::Value {
    let mut parts = vec![serde_json::json!({ "text": prompt })];
    parts.extend(images.iter().map(gemini_image_part));
    gemini_body(
        serde_json::json!([{ "role": "user", "parts": parts }]),
        options,
    )
}

/// Gemini names the assistant role `model`.
fn gemini_chat_request(turns: &[ChatTurn], options: &GenerationOptions) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = turns
        .iter()
        .map(|t| {
            let role = match t.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": t.content }] })
        })
        .collect();
    gemini_body(serde_json::Value::Array(contents), options)
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow!("Gemini returned no answer: {}", reason)
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing content parts"))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .concat())
}

impl GeminiGenerator {
    async fn send(&self, body: &serde_json::Value) -> Result<String> {
        let key = api_key("GOOGLE_API_KEY")?;
        let model_path = gemini_model_path(&self.model);
        let json = send_json(
            self.client
                .post(format!(
                    "{}/{}:generateContent",
                    self.url.trim_end_matches('/'),
                    model_path
                ))
                .header("x-goog-api-key", key)
                .json(body),
            "Gemini",
        )
        .await?;
        parse_gemini_response(&json)
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!(model = %self.model, chars = prompt.len(), "gemini generateContent");
        self.send(&gemini_request(prompt, &[], options)).await
    }

    async fn generate_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
        options: &GenerationOptions,
    ) -> Result<String> {
        debug!(model = %self.model, images = images.len(), "gemini generateContent");
        self.send(&gemini_request(prompt, images, options)).await
    }

    async fn chat(&self, turns: &[ChatTurn], options: &GenerationOptions) -> Result<String> {
        debug!(model = %self.model, turns = turns.len(), "gemini chat");
        self.send(&gemini_chat_request(turns, options)).await
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "OpenAI")?,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Content array of one user message: text, then images as data URLs.
fn openai_user_content(prompt: &str, images: &[ImagePart]) -> serde_json::Value {
    if images.is_empty() {
        return serde_json::json!(prompt);
    }
    let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
    content.extend(images.iter().map(|image| {
        serde_json::json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", image.media_type, STANDARD.encode(&image.bytes))
            }
        })
    }));
    serde_json::Value::Array(content)
}

fn openai_request(
    model: &str,
    messages: serde_json::Value,
    options: &GenerationOptions,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": options.temperature,
    });
    if let Some(max) = options.max_tokens {
        body["max_tokens"] = serde_json::json!(max);
    }
    body
}

fn openai_chat_messages(turns: &[ChatTurn]) -> serde_json::Value {
    serde_json::Value::Array(
        turns
            .iter()
            .map(|t| serde_json::json!({ "role": t.role.to_string(), "content": t.content }))
            .collect(),
    )
}

impl OpenAIGenerator {
    async fn send(&self, body: &serde_json::Value) -> Result<String> {
        let key = api_key("OPENAI_API_KEY")?;
        let json = send_json(
            self.client
                .post(format!("{}/chat/completions", self.url.trim_end_matches('/')))
                .bearer_auth(key)
                .json(body),
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.generate_with_images(prompt, &[], options).await
    }

    async fn generate_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
        options: &GenerationOptions,
    ) -> Result<String> {
        let messages = serde_json::json!([
            { "role": "user", "content": openai_user_content(prompt, images) }
        ]);
        self.send(&openai_request(&self.model, messages, options)).await
    }

    async fn chat(&self, turns: &[ChatTurn], options: &GenerationOptions) -> Result<String> {
        self.send(&openai_request(&self.model, openai_chat_messages(turns), options))
            .await
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Ollama")?,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn ollama_options(options: &GenerationOptions) -> serde_json::Value {
    let mut ollama_options = serde_json::json!({ "temperature": options.temperature });
    if let Some(max) = options.max_tokens {
        ollama_options["num_predict"] = serde_json::json!(max);
    }
    ollama_options
}

fn ollama_generate_request(
    model: &str,
    prompt: &str,
    images: &[ImagePart],
    options: &GenerationOptions,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": ollama_options(options),
    });
    if !images.is_empty() {
        let encoded: Vec<String> = images.iter().map(|i| STANDARD.encode(&i.bytes)).collect();
        body["images"] = serde_json::json!(encoded);
    }
    body
}

impl OllamaGenerator {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.generate_with_images(prompt, &[], options).await
    }

    async fn generate_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
        options: &GenerationOptions,
    ) -> Result<String> {
        let body = ollama_generate_request(&self.model, prompt, images, options);
        let json = send_json(
            self.client.post(self.endpoint("generate")).json(&body),
            "Ollama",
        )
        .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response"))
    }

    async fn chat(&self, turns: &[ChatTurn], options: &GenerationOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": openai_chat_messages(turns),
            "stream": false,
            "options": ollama_options(options),
        });
        let json =
            send_json(self.client.post(self.endpoint("chat")).json(&body), "Ollama").await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }
}

/// Create the generator named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
