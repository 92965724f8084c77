//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use docrag::embedding::EmbeddingFunction;
use docrag::error::EmbeddingError;
use docrag::sqlite_store::SqliteCollection;

pub const DIMS: usize = 32;

/// Hashed bag-of-words vectors; deterministic and offline.
pub struct WordHashEmbedder;

#[async_trait]
impl EmbeddingFunction for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let hash = word
                        .to_lowercase()
                        .bytes()
                        .fold(5381u64, |h, b| h.wrapping_mul(33) ^ u64::from(b));
                    v[(hash % DIMS as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

pub async fn open_collection(storage: &Path) -> SqliteCollection {
    SqliteCollection::open(storage, "documents_collection", Arc::new(WordHashEmbedder))
        .await
        .unwrap()
}

/// `n` characters of readable filler, no blank lines.
pub fn filler(n: usize) -> String {
    "lorem ipsum dolor sit amet "
        .chars()
        .cycle()
        .take(n)
        .collect()
}
