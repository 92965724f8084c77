use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;

/// Database file created inside the storage directory.
pub const DB_FILE_NAME: &str = "docrag.sqlite3";

/// Open (creating if needed) the database inside `storage_dir`.
pub async fn connect(storage_dir: &Path) -> Result<SqlitePool, StorageError> {
    std::fs::create_dir_all(storage_dir).map_err(|source| StorageError::Io {
        path: storage_dir.to_path_buf(),
        source,
    })?;

    let db_path = storage_dir.join(DB_FILE_NAME);
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
