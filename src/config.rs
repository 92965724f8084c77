//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) reproduces the stock pipeline: `data/` ingested into
//! `storage/chroma_db`, 500/50 character chunks, 4 search results, local
//! `all-minilm-l6-v2` embeddings and an Ollama chat backend.
//!
//! ```toml
//! [storage]
//! path = "storage/chroma_db"
//! collection = "documents_collection"
//!
//! [ingest]
//! data_dir = "data"
//! batch_size = 100
//! exclude_globs = ["*.tmp"]
//!
//! [chunking]
//! chunk_size = 500
//! overlap = 50
//!
//! [chat]
//! provider = "groq"
//! model = "openai/gpt-oss-120b"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{ChunkParams, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            collection: default_collection(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("storage/chroma_db")
}
fn default_collection() -> String {
    "documents_collection".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Maximum records per collection insert.
    #[serde(default = "default_insert_batch")]
    pub batch_size: usize,
    /// File-name globs skipped during sync.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            batch_size: default_insert_batch(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_insert_batch() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
        }
    }
}

fn default_n_results() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama backend.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_embed_batch(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_embed_batch() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Overrides the provider's default base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    #[serde(default)]
    pub stream: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            model: default_chat_model(),
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_chat_timeout(),
            memory_size: default_memory_size(),
            stream: false,
        }
    }
}

fn default_chat_provider() -> String {
    "ollama".to_string()
}
fn default_chat_model() -> String {
    "gpt-oss:120b-cloud".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_chat_timeout() -> u64 {
    120
}
fn default_memory_size() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `"warn"` or `"info,docrag::sync=debug"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Check cross-field constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<()> {
        self.chunking
            .params()
            .validate()
            .context("invalid [chunking] section")?;

        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be >= 1");
        }
        if self.retrieval.n_results == 0 {
            bail!("retrieval.n_results must be >= 1");
        }
        if self.chat.memory_size == 0 {
            bail!("chat.memory_size must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            bail!("chat.temperature must be in [0.0, 2.0]");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "local" | "ollama" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local, ollama, or openai.",
                other
            ),
        }

        match self.chat.provider.as_str() {
            "ollama" | "openai" | "groq" => {}
            other => bail!(
                "Unknown chat provider: '{}'. Must be ollama, openai, or groq.",
                other
            ),
        }

        Ok(())
    }
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
///
/// Used for the CLI's implicit default path; an explicitly passed path
/// should go through [`load_config`] so typos are reported.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}
