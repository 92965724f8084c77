//! Error types for the ingestion, storage, and chat layers.
//!
//! Library code returns these typed errors; the CLI wraps them with
//! `anyhow` context. Per-file failures ([`LoadError`], [`ChunkError`]) are
//! caught by the synchronizer and skipped, while [`StorageError`] is always
//! surfaced to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid chunking parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidOverlap { chunk_size: usize, overlap: usize },
}

/// Failure inside a single format extractor.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Errors raised by the loader.
///
/// Callers only ever see these two variants; the per-format cause is kept
/// as the error source of [`LoadError::Failed`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("failed to load {path}: {source}")]
    Failed {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },
}

/// Anything that stops one document from producing chunks.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Errors from an embedding backend.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{backend} API error {status}: {body}")]
    Api {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding backend misconfigured: {0}")]
    Config(String),

    #[error("local embedding failed: {0}")]
    Local(String),
}

/// Errors from the persisted collection.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare storage directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(
        "collection '{collection}' was created with embedding model '{stored}', \
         cannot open it with '{requested}'"
    )]
    EmbeddingMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    #[error("malformed batch: {ids} ids, {documents} documents, {metadatas} metadata records")]
    MalformedBatch {
        ids: usize,
        documents: usize,
        metadatas: usize,
    },

    #[error("embedding backend returned {got} vectors for {expected} documents")]
    VectorCount { expected: usize, got: usize },

    #[error("collection lock poisoned")]
    LockPoisoned,
}

/// Errors that abort a sync or reindex pass.
///
/// Per-file load and chunk failures during `sync` are not in here: they are
/// logged, recorded in the report, and skipped.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(#[from] ChunkError),

    #[error("invalid exclude glob: {0}")]
    InvalidGlob(#[from] globset::Error),

    #[error("failed to list {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Errors from a chat backend.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid API key for {0}")]
    InvalidApiKey(&'static str),

    #[error("{0} rate limit exceeded, try again later")]
    RateLimited(&'static str),

    #[error("network error talking to {backend}: {message}")]
    Network {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} API error {status}: {body}")]
    Api {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid response from {backend}: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },

    #[error("chat backend misconfigured: {0}")]
    Config(String),
}
