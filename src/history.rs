//! Query history: the questions asked of the SQL database and the
//! statements they were translated to.
//!
//! Stored as a JSON array. Saves write a sibling temp file and rename it
//! into place, so a crash mid-write never leaves a truncated history.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub sql: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only history capped to the most recent `limit` entries.
#[derive(Debug)]
pub struct QueryHistory {
    path: PathBuf,
    limit: usize,
    entries: Vec<HistoryEntry>,
}

impl QueryHistory {
    /// Load history from `path`. A missing file is an empty history.
    pub fn load(path: &Path, limit: usize) -> Result<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str::<Vec<HistoryEntry>>(&content)
                .with_context(|| format!("Corrupt query history: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read query history: {}", path.display()))
            }
        };

        let mut history = Self {
            path: path.to_path_buf(),
            limit: limit.max(1),
            entries,
        };
        history.truncate();
        Ok(history)
    }

    pub fn record(&mut self, question: &str, sql: &str) {
        self.entries.push(HistoryEntry {
            question: question.to_string(),
            sql: sql.to_string(),
            timestamp: Utc::now(),
        });
        self.truncate();
    }

    /// Entries oldest first.
    pub fn recent(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries)
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
    }
}

/// Write `value` as pretty JSON through a sibling temp file.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
