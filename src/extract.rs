//! Text extraction for uploaded documents (PDF, DOCX, plain text), and
//! loading of images for the vision tasks.
//!
//! [`DocumentExtractor`] implements the core [`TextExtractor`] seam used by
//! the indexing pipeline. Unreadable input is an [`ExtractError`]; a panic
//! inside the PDF parser is caught and reported as [`ExtractError::Pdf`].

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use thiserror::Error;

use query_harness_core::generation::ImagePart;
use query_harness_core::models::{
    Document, TextExtractor, MIME_DOCX, MIME_MARKDOWN, MIME_PDF, MIME_PLAIN,
};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Extracts plain text from bytes of the given media type.
pub fn extract_text(bytes: &[u8], media_type: &str) -> Result<String, ExtractError> {
    match media_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PLAIN | MIME_MARKDOWN => Ok(String::from_utf8(bytes.to_vec())?),
        _ => Err(ExtractError::UnsupportedContentType(media_type.to_string())),
    }
}

/// Extractor for every media type the indexer accepts.
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, doc: &Document) -> Result<String> {
        Ok(extract_text(&doc.bytes, &doc.media_type)?)
    }
}

/// Media type implied by a file extension, if supported.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "txt" | "text" => Some(MIME_PLAIN),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

/// Read a file into a [`Document`], inferring its media type from the extension.
pub fn load_document(path: &Path) -> Result<Document> {
    let media_type = media_type_for_path(path)
        .ok_or_else(|| anyhow::anyhow!("Unsupported file type: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Document::new(name, media_type, bytes))
}

/// Image media type implied by a file extension, if supported.
pub fn image_media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn load_image(path: &Path) -> Result<ImagePart> {
    let media_type = image_media_type_for_path(path).ok_or_else(|| {
        anyhow::anyhow!(
            "Unsupported image type: {} (expected png, jpg, jpeg, gif or webp)",
            path.display()
        )
    })?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(ImagePart::new(media_type, bytes))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));
    match outcome {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "parser panicked".to_string());
            Err(ExtractError::Pdf(message))
        }
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    paragraphs_text(&doc_xml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph.
fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}
