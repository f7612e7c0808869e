//! Conversation log for `qh chat`.
//!
//! Stored as `{"messages": [...]}` with a timestamp per message. Only
//! complete exchanges are saved: a reply that fails leaves the log as it
//! was.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use query_harness_core::generation::{ChatRole, ChatTurn};

use crate::history::write_json_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatFile {
    messages: Vec<ChatMessage>,
}

#[derive(Debug)]
pub struct ChatLog {
    path: PathBuf,
    limit: usize,
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    /// Load the log at `path`. A missing or empty file is an empty log.
    pub fn load(path: &Path, limit: usize) -> Result<Self> {
        let file = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => ChatFile::default(),
            Ok(content) => serde_json::from_str::<ChatFile>(&content)
                .with_context(|| format!("Corrupt chat history: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ChatFile::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read chat history: {}", path.display()))
            }
        };
        let mut log = Self::empty(path, limit);
        log.messages = file.messages;
        log.truncate();
        Ok(log)
    }

    /// An empty log that will save to `path`.
    pub fn empty(path: &Path, limit: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            limit: limit.max(1),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The log as turns for a generation provider.
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Append a user message and the reply to it.
    pub fn record_exchange(&mut self, message: &str, reply: &str) {
        let now = Utc::now();
        for (role, content) in [(ChatRole::User, message), (ChatRole::Assistant, reply)] {
            self.messages.push(ChatMessage {
                role,
                content: content.to_string(),
                timestamp: now,
            });
        }
        self.truncate();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(
            &self.path,
            &serde_json::json!({ "messages": self.messages }),
        )
    }

    fn truncate(&mut self) {
        if self.messages.len() > self.limit {
            let excess = self.messages.len() - self.limit;
            self.messages.drain(..excess);
        }
    }
}
