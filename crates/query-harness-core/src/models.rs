//! Input document type and the text-extraction seam.

use anyhow::{bail, Result};

pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// An uploaded document: opaque bytes plus a declared media type.
///
/// Consumed once by the indexing pipeline and not retained.
#[derive(Debug, Clone)]
pub struct Document {
    /// Display name, usually the file name.
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn plain_text(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, MIME_PLAIN, text.as_bytes().to_vec())
    }
}

/// Turns a [`Document`] into plain UTF-8 text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, doc: &Document) -> Result<String>;
}

/// Extractor for `text/plain` and `text/markdown` only.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, doc: &Document) -> Result<String> {
        match doc.media_type.as_str() {
            MIME_PLAIN | MIME_MARKDOWN => Ok(String::from_utf8(doc.bytes.clone())?),
            other => bail!("unsupported content-type: {}", other),
        }
    }
}
