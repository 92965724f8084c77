//! SQLite-backed [`Collection`].
//!
//! All collections under one storage directory share a single database
//! file. Vectors are stored as little-endian `f32` BLOBs and ranked by
//! brute-force cosine similarity at query time, which is adequate for the
//! document counts a local folder produces.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob, EmbeddingFunction};
use crate::error::StorageError;
use crate::migrate;
use crate::processor::ChunkMetadata;
use crate::store::{
    embed_documents, embed_query, rank_hits, validate_batch, Collection, MetadataEntry, SearchHit,
};

/// A named collection persisted in `<storage_dir>/docrag.sqlite3`.
pub struct SqliteCollection {
    pool: SqlitePool,
    name: String,
    embedder: Arc<dyn EmbeddingFunction>,
}

impl SqliteCollection {
    /// Open the collection `name` under `storage_dir`, creating the
    /// database and the collection on first use.
    ///
    /// # Errors
    ///
    /// [`StorageError::EmbeddingMismatch`] if the collection already exists
    /// and was created with a different embedding model or dimensionality.
    pub async fn open(
        storage_dir: &Path,
        name: &str,
        embedder: Arc<dyn EmbeddingFunction>,
    ) -> Result<Self, StorageError> {
        let pool = db::connect(storage_dir).await?;
        migrate::run_migrations(&pool).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, embedding_model, dims, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(embedder.model_name())
        .bind(embedder.dims() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&pool)
        .await?;

        let row = sqlx::query("SELECT embedding_model, dims FROM collections WHERE name = ?")
            .bind(name)
            .fetch_one(&pool)
            .await?;
        let stored_model: String = row.try_get("embedding_model")?;
        let stored_dims: i64 = row.try_get("dims")?;

        if stored_model != embedder.model_name() || stored_dims != embedder.dims() as i64 {
            return Err(StorageError::EmbeddingMismatch {
                collection: name.to_string(),
                stored: format!("{} ({} dims)", stored_model, stored_dims),
                requested: format!("{} ({} dims)", embedder.model_name(), embedder.dims()),
            });
        }

        info!(
            collection = name,
            path = %storage_dir.display(),
            model = %stored_model,
            "opened collection"
        );

        Ok(Self {
            pool,
            name: name.to_string(),
            embedder,
        })
    }

    /// Embedding model this collection is bound to.
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Close the underlying pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Collection for SqliteCollection {
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
        if ids.is_empty() {
            return Ok(());
        }
        let vectors = embed_documents(self.embedder.as_ref(), documents).await?;

        let mut tx = self.pool.begin().await?;
        for (((id, document), metadata), vector) in
            ids.iter().zip(documents).zip(metadatas).zip(&vectors)
        {
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, source, chunk_index, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    source = excluded.source,
                    chunk_index = excluded.chunk_index,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.name)
            .bind(id)
            .bind(document)
            .bind(&metadata.source)
            .bind(metadata.chunk_index as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(collection = %self.name, records = ids.len(), "upserted batch");
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Vec<MetadataEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, source, chunk_index FROM records WHERE collection = ? \
             ORDER BY source, chunk_index",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<MetadataEntry, StorageError> {
                let chunk_index: i64 = row.try_get("chunk_index")?;
                Ok(MetadataEntry {
                    id: row.try_get("id")?,
                    metadata: ChunkMetadata {
                        source: row.try_get("source")?,
                        chunk_index: chunk_index as usize,
                    },
                })
            })
            .collect()
    }

    async fn query(&self, query: &str, n_results: usize) -> Result<Vec<SearchHit>, StorageError> {
        if n_results == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            "SELECT id, document, source, chunk_index, embedding FROM records \
             WHERE collection = ?",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<(String, String, ChunkMetadata, Vec<f32>)> =
            Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk_index: i64 = row.try_get("chunk_index")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            candidates.push((
                row.try_get("id")?,
                row.try_get("document")?,
                ChunkMetadata {
                    source: row.try_get("source")?,
                    chunk_index: chunk_index as usize,
                },
                blob_to_vec(&blob),
            ));
        }

        Ok(rank_hits(&query_vec, candidates, n_results))
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StorageError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND source = ?")
            .bind(&self.name)
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
