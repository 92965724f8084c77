use sqlx::SqlitePool;

use crate::error::StorageError;

/// Create the collection schema. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    // One row per named collection, pinning its embedding function
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            embedding_model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunk records; `source` and `chunk_index` are the stored metadata
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(collection, source)")
        .execute(pool)
        .await?;

    Ok(())
}
