//! Fixed-window text chunker.
//!
//! Splits extracted document text into overlapping windows of at most
//! `chunk_size` characters. Boundaries are purely positional: no attempt is
//! made to respect sentences or paragraphs.
//!
//! Before windowing, text is trimmed and every `"\n\n"` is collapsed into a
//! single `"\n"` in one left-to-right pass. Tabs, spaces and single newlines
//! are preserved. Lengths and offsets count `char`s, not bytes.

use crate::error::ChunkError;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default number of characters shared between consecutive windows.
pub const DEFAULT_OVERLAP: usize = 50;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkParams {
    /// Checks `0 < chunk_size` and `overlap < chunk_size`.
    ///
    /// Without this the window would never advance.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkError::InvalidOverlap {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Trim and collapse double newlines.
pub fn normalize(text: &str) -> String {
    text.trim().replace("\n\n", "\n")
}

/// Split `text` into overlapping windows.
///
/// Each window covers `[offset, min(offset + chunk_size, len))` of the
/// normalized text, is trimmed, and is kept only if non-empty. The offset
/// advances by `chunk_size - overlap`.
///
/// # Errors
///
/// Returns [`ChunkError`] when `overlap >= chunk_size` or `chunk_size == 0`.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    let params = ChunkParams {
        chunk_size,
        overlap,
    };
    params.validate()?;

    let chars: Vec<char> = normalize(text).chars().collect();
    let mut chunks = Vec::new();
    let mut offset = 0;

    while offset < chars.len() {
        let end = (offset + chunk_size).min(chars.len());
        let window: String = chars[offset..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        offset += params.step();
    }

    Ok(chunks)
}

/// [`split`] with the default 500/50 parameters.
pub fn split_default(text: &str) -> Vec<String> {
    // Defaults always satisfy the overlap precondition.
    split(text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP).unwrap_or_default()
}

/// Stable identifier of the `index`-th chunk of `file_name`.
pub fn chunk_id(file_name: &str, index: usize) -> String {
    format!("{}_chunk_{}", file_name, index)
}
