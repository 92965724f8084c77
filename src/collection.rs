//! Collection accessor.
//!
//! `(path, name)` is the identity of a collection: opening the same pair
//! again, in this process or a later one, yields a handle to the same
//! stored records. The embedding function is fixed when the collection is
//! first created; reopening with another model is refused.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingFunction};
use crate::error::StorageError;
use crate::sqlite_store::SqliteCollection;

/// Open or create the persisted collection `name` under `path`.
pub async fn get_collection(
    path: &Path,
    name: &str,
    embedder: Arc<dyn EmbeddingFunction>,
) -> Result<SqliteCollection, StorageError> {
    SqliteCollection::open(path, name, embedder).await
}

/// [`get_collection`] for the `[storage]` and `[embedding]` config sections.
pub async fn open_configured(config: &Config) -> Result<SqliteCollection, StorageError> {
    let embedder = create_embedder(&config.embedding)?;
    get_collection(&config.storage.path, &config.storage.collection, embedder).await
}
