//! Collection abstraction.
//!
//! A [`Collection`] is a named, embedding-backed store of
//! `(id, document, metadata)` records. Inserts are upserts keyed by id, so
//! re-adding an unchanged document is harmless. Nearest-neighbour scoring
//! belongs to the collection; callers only pass `n_results` through.
//!
//! Implementations:
//! - [`SqliteCollection`](crate::sqlite_store::SqliteCollection): persisted on disk.
//! - [`InMemoryCollection`]: process-local, for tests and embedding in other tools.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::{cosine_similarity, EmbeddingFunction};
use crate::error::StorageError;
use crate::processor::ChunkMetadata;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance (`1 - similarity`); smaller is closer.
    pub distance: f32,
}

/// Id and metadata of a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub id: String,
    pub metadata: ChunkMetadata,
}

/// Storage backend for chunk records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](Collection::add) | Embed and upsert a batch of records |
/// | [`get_metadata`](Collection::get_metadata) | All stored ids and metadata |
/// | [`query`](Collection::query) | Nearest records to a query text |
/// | [`delete_by_source`](Collection::delete_by_source) | Drop every chunk of one file |
/// | [`count`](Collection::count) | Number of stored records |
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Embed `documents` and upsert them under `ids`.
    ///
    /// The three slices are parallel and must have equal length. A failed
    /// call stores nothing.
    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<(), StorageError>;

    async fn get_metadata(&self) -> Result<Vec<MetadataEntry>, StorageError>;

    /// Up to `n_results` records ordered by ascending distance to `query`.
    async fn query(&self, query: &str, n_results: usize) -> Result<Vec<SearchHit>, StorageError>;

    /// Delete every record whose `source` is `source`; returns how many.
    async fn delete_by_source(&self, source: &str) -> Result<usize, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;
}

/// Reject batches whose parallel slices disagree in length.
pub fn validate_batch(
    ids: &[String],
    documents: &[String],
    metadatas: &[ChunkMetadata],
) -> Result<(), StorageError> {
    if ids.len() != documents.len() || ids.len() != metadatas.len() {
        return Err(StorageError::MalformedBatch {
            ids: ids.len(),
            documents: documents.len(),
            metadatas: metadatas.len(),
        });
    }
    Ok(())
}

/// Embed `documents`, checking one vector comes back per document.
///
/// An empty batch never reaches the backend.
pub(crate) async fn embed_documents(
    embedder: &dyn EmbeddingFunction,
    documents: &[String],
) -> Result<Vec<Vec<f32>>, StorageError> {
    if documents.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed(documents).await?;
    if vectors.len() != documents.len() {
        return Err(StorageError::VectorCount {
            expected: documents.len(),
            got: vectors.len(),
        });
    }
    Ok(vectors)
}

/// Embed a single query text.
pub(crate) async fn embed_query(
    embedder: &dyn EmbeddingFunction,
    query: &str,
) -> Result<Vec<f32>, StorageError> {
    let mut vectors = embed_documents(embedder, &[query.to_string()]).await?;
    vectors.pop().ok_or(StorageError::VectorCount {
        expected: 1,
        got: 0,
    })
}

/// Brute-force cosine ranking shared by the collection backends.
pub(crate) fn rank_hits(
    query_vec: &[f32],
    candidates: impl IntoIterator<Item = (String, String, ChunkMetadata, Vec<f32>)>,
    n_results: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|(id, document, metadata, vector)| SearchHit {
            distance: 1.0 - cosine_similarity(query_vec, &vector),
            id,
            document,
            metadata,
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(n_results);
    hits
}

struct StoredRecord {
    document: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

/// In-memory collection behind a `RwLock`.
pub struct InMemoryCollection {
    name: String,
    embedder: Arc<dyn EmbeddingFunction>,
    records: RwLock<BTreeMap<String, StoredRecord>>,
}

impl InMemoryCollection {
    pub fn new(name: &str, embedder: Arc<dyn EmbeddingFunction>) -> Self {
        Self {
            name: name.to_string(),
            embedder,
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<(), StorageError> {
        validate_batch(ids, documents, metadatas)?;
        let vectors = embed_documents(self.embedder.as_ref(), documents).await?;

        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        for (((id, document), metadata), vector) in
            ids.iter().zip(documents).zip(metadatas).zip(vectors)
        {
            records.insert(
                id.clone(),
                StoredRecord {
                    document: document.clone(),
                    metadata: metadata.clone(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Vec<MetadataEntry>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .iter()
            .map(|(id, record)| MetadataEntry {
                id: id.clone(),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    async fn query(&self, query: &str, n_results: usize) -> Result<Vec<SearchHit>, StorageError> {
        if n_results == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        let candidates = records.iter().map(|(id, record)| {
            (
                id.clone(),
                record.document.clone(),
                record.metadata.clone(),
                record.vector.clone(),
            )
        });
        Ok(rank_hits(&query_vec, candidates, n_results))
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = records.len();
        records.retain(|_, record| record.metadata.source != source);
        Ok(before - records.len())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.records.read().map_err(|_| StorageError::LockPoisoned)?.len())
    }
}
