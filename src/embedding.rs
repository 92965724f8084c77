//! Embedding functions and vector utilities.
//!
//! A collection is bound to one [`EmbeddingFunction`] for its whole life:
//! documents are embedded on insert and queries on search. Backends:
//! - **[`LocalEmbedder`]**: fastembed models run in-process (default
//!   `all-minilm-l6-v2`, 384 dims); no network after the first download.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on an Ollama instance.
//! - **[`OpenAIEmbedder`]**: `POST https://api.openai.com/v1/embeddings`.
//!
//! Also provides the helpers the SQLite collection uses for BLOB storage and
//! brute-force ranking: [`vec_to_blob`], [`blob_to_vec`], [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! The HTTP backends retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// A fixed text → vector mapping.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    /// Model identifier recorded with the collection (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed `texts`, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Build the embedding function named by `config.provider`.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"local"` | [`LocalEmbedder`] (requires the `local-embeddings-fastembed` feature) |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
pub fn create_embedder(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingFunction>, EmbeddingError> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(EmbeddingError::Config(
            "local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        other => Err(EmbeddingError::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Dimensionality of well-known models, used when `embedding.dims` is unset.
pub fn known_dims(model: &str) -> Option<usize> {
    match model {
        "all-minilm-l6-v2" | "all-minilm" | "bge-small-en-v1.5" | "multilingual-e5-small" => {
            Some(384)
        }
        "bge-base-en-v1.5"
        | "nomic-embed-text"
        | "nomic-embed-text-v1"
        | "nomic-embed-text-v1.5"
        | "multilingual-e5-base" => Some(768),
        "bge-large-en-v1.5" | "mxbai-embed-large" | "multilingual-e5-large" => Some(1024),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

fn resolve_dims(config: &EmbeddingConfig) -> Result<usize, EmbeddingError> {
    config
        .dims
        .or_else(|| known_dims(&config.model))
        .filter(|d| *d > 0)
        .ok_or_else(|| {
            EmbeddingError::Config(format!(
                "embedding.dims must be set for unknown model '{}'",
                config.model
            ))
        })
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, EmbeddingError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// POST `body` as JSON, retrying 429/5xx and network failures.
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    backend: &'static str,
    max_retries: u32,
) -> Result<serde_json::Value, EmbeddingError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(backend, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = EmbeddingError::Api {
                    backend,
                    status: status.as_u16(),
                    body: body_text,
                };

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(EmbeddingError::Request(e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        EmbeddingError::InvalidResponse(format!("{} embedding failed after retries", backend))
    }))
}

fn json_to_vec(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let items = value
        .as_array()
        .ok_or_else(|| EmbeddingError::InvalidResponse("embedding is not an array".to_string()))?;
    Ok(items
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ OpenAI ============

/// Embeddings from the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EmbeddingError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            model: config.model.clone(),
            dims: resolve_dims(config)?,
            api_key,
            client: http_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingFunction for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            "OpenAI",
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".to_string()))?;
        indexed.push((index, json_to_vec(embedding)?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embeddings from a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model: config.model.clone(),
            dims: resolve_dims(config)?,
            url: url.trim_end_matches('/').to_string(),
            client: http_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingFunction for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            "Ollama",
            self.max_retries,
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing embeddings array".to_string()))?
        .iter()
        .map(json_to_vec)
        .collect()
}

// ============ Local (fastembed) ============

/// In-process embeddings via fastembed.
///
/// The model is downloaded from Hugging Face on first use and kept loaded
/// for the lifetime of the embedder. Inference runs on the blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        // Reject unknown names before any download is attempted.
        config_to_fastembed_model(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims.or_else(|| known_dims(&config.model)).unwrap_or(384),
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(EmbeddingError::Config(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingFunction for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let fastembed_model = config_to_fastembed_model(&self.model_name)?;
        let cache = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = cache
                .lock()
                .map_err(|_| EmbeddingError::Local("model lock poisoned".to_string()))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model)
                        .with_show_download_progress(true),
                )
                .map_err(|e| {
                    EmbeddingError::Local(format!("failed to initialize model: {}", e))
                })?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| EmbeddingError::Local("model not loaded".to_string()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbeddingError::Local(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Local(e.to_string()))?
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use docrag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
