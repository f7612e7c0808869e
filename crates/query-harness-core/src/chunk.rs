//! Overlapping fixed-window text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of `size` characters where
//! each window after the first starts `overlap` characters before the
//! previous one ended. Windows are measured in `char`s, so multibyte text
//! never splits inside a code point.
//!
//! # Algorithm
//!
//! 1. Validate `0 < size` and `overlap < size`.
//! 2. Emit the window `[start, start + size)` (clamped to the text end).
//! 3. If the window reached the end of the text, stop.
//! 4. Otherwise advance `start` by `size - overlap` characters and repeat.
//!
//! The iterator is lazy and finite. Clone it to walk the chunks again.
//!
//! # Example
//!
//! ```rust
//! use query_harness_core::chunk::{chunk_text, reassemble};
//!
//! let text = "abcdefghij";
//! let chunks: Vec<_> = chunk_text(text, 4, 1).unwrap().collect();
//! assert_eq!(chunks[0].text, "abcd");
//! assert_eq!(chunks[1].text, "defg");
//! assert_eq!(reassemble(&chunks), text);
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Default window length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 1_000;

/// A contiguous window of the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of this chunk in the sequence, starting at 0.
    pub index: usize,
    /// Character offset (inclusive) of the window in the source text.
    pub start: usize,
    /// Character offset (exclusive) of the window in the source text.
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        let params = Self { size, overlap };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidConfiguration(
                "chunk size must be > 0".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(Error::InvalidConfiguration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Lazy iterator over the chunks of a text.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    params: ChunkParams,
    byte_pos: usize,
    char_pos: usize,
    index: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done || self.byte_pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.byte_pos..];
        let (window_bytes, window_chars) = match rest.char_indices().nth(self.params.size) {
            Some((b, _)) => (b, self.params.size),
            None => (rest.len(), rest.chars().count()),
        };

        let chunk = make_chunk(
            self.index,
            self.char_pos,
            self.char_pos + window_chars,
            &rest[..window_bytes],
        );
        self.index += 1;

        if window_bytes == rest.len() {
            self.done = true;
        } else {
            let step = self.params.size - self.params.overlap;
            // step < size and the window was full, so this char exists
            let advance = rest
                .char_indices()
                .nth(step)
                .map(|(b, _)| b)
                .unwrap_or(rest.len());
            self.byte_pos += advance;
            self.char_pos += step;
        }

        Some(chunk)
    }
}

/// Split `text` into overlapping windows of `size` characters.
///
/// # Errors
///
/// [`Error::InvalidConfiguration`] if `size == 0` or `overlap >= size`.
/// Empty text is not an error and yields no chunks.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Chunks<'_>> {
    chunk_with(text, ChunkParams::new(size, overlap)?)
}

/// Like [`chunk_text`], with pre-built parameters.
pub fn chunk_with(text: &str, params: ChunkParams) -> Result<Chunks<'_>> {
    params.validate()?;
    Ok(Chunks {
        text,
        params,
        byte_pos: 0,
        char_pos: 0,
        index: 0,
        done: false,
    })
}

/// Rebuild the source text from its chunks, dropping the overlapping prefix
/// of every chunk after the first.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for c in chunks {
        let skip = covered.saturating_sub(c.start);
        out.extend(c.text.chars().skip(skip));
        covered = covered.max(c.end);
    }
    out
}

/// SHA-256 of a string, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(index: usize, start: usize, end: usize, text: &str) -> Chunk {
    Chunk {
        index,
        start,
        end,
        text: text.to_string(),
        hash: content_hash(text),
    }
}
