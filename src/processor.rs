//! Single-document processing: load, chunk, and label.
//!
//! Produces parallel `ids` / `chunks` / `metadatas` sequences ready for a
//! collection insert. [`process`] never fails: a broken file is logged and
//! contributes nothing, so one bad document cannot abort a sync pass.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chunk::{self, ChunkParams};
use crate::error::ProcessError;
use crate::extract::LoaderRegistry;

/// Per-chunk metadata stored alongside each record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name of the originating document.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
}

/// Parallel sequences for one document; index `i` of each belongs together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDocument {
    pub ids: Vec<String>,
    pub chunks: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
}

impl ProcessedDocument {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Load and chunk `path`, propagating any failure.
pub fn try_process(
    registry: &LoaderRegistry,
    path: &Path,
    params: ChunkParams,
) -> Result<ProcessedDocument, ProcessError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ProcessError::NoFileName(path.to_path_buf()))?;

    let text = registry.load(path)?;
    let chunks = chunk::split(&text, params.chunk_size, params.overlap)?;

    let ids = (0..chunks.len())
        .map(|i| chunk::chunk_id(&file_name, i))
        .collect();
    let metadatas = (0..chunks.len())
        .map(|chunk_index| ChunkMetadata {
            source: file_name.clone(),
            chunk_index,
        })
        .collect();

    Ok(ProcessedDocument {
        ids,
        chunks,
        metadatas,
    })
}

/// Like [`try_process`], but failures are logged and yield an empty result.
pub fn process(registry: &LoaderRegistry, path: &Path, params: ChunkParams) -> ProcessedDocument {
    match try_process(registry, path, params) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "skipping document");
            ProcessedDocument::default()
        }
    }
}
