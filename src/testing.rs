//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingFunction;
use crate::error::{EmbeddingError, StorageError};
use crate::processor::ChunkMetadata;
use crate::store::{Collection, InMemoryCollection, MetadataEntry, SearchHit};

const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: each lowercased word bumps one of
/// 64 buckets chosen by an FNV-1a hash. No model download, no network.
pub struct KeywordEmbedder {
    model: String,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::named("keyword-test")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        v[(hash % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingFunction for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Wraps a collection and records the size of every `add` call.
///
/// With [`fail_after`](RecordingCollection::fail_after), inserts beyond the
/// given number of successful calls fail with a storage error.
pub struct RecordingCollection<C = InMemoryCollection> {
    inner: C,
    batches: Mutex<Vec<usize>>,
    fail_after: Option<usize>,
}

impl<C: Collection> RecordingCollection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            batches: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    pub fn fail_after(mut self, successful_calls: usize) -> Self {
        self.fail_after = Some(successful_calls);
        self
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl<C: Collection> Collection for RecordingCollection<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<(), StorageError> {
        {
            let batches = self.batches.lock().unwrap();
            if self.fail_after.is_some_and(|limit| batches.len() >= limit) {
                return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
            }
        }
        self.inner.add(ids, documents, metadatas).await?;
        self.batches.lock().unwrap().push(ids.len());
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Vec<MetadataEntry>, StorageError> {
        self.inner.get_metadata().await
    }

    async fn query(&self, query: &str, n_results: usize) -> Result<Vec<SearchHit>, StorageError> {
        self.inner.query(query, n_results).await
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StorageError> {
        self.inner.delete_by_source(source).await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.inner.count().await
    }
}
