//! Semantic search over a collection.
//!
//! Ranking is entirely the collection's job; this layer only forwards
//! `n_results` and packages the hits.

use serde::Serialize;

use crate::error::StorageError;
use crate::store::{Collection, SearchHit};

/// Default number of chunks retrieved per query.
pub const DEFAULT_N_RESULTS: usize = 4;

/// Ranked hits for one query, closest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// Chunk texts in rank order.
    pub fn documents(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.document.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Nearest `n_results` chunks to `query`.
pub async fn semantic_search(
    collection: &dyn Collection,
    query: &str,
    n_results: usize,
) -> Result<SearchResults, StorageError> {
    let hits = collection.query(query, n_results).await?;
    Ok(SearchResults { hits })
}
