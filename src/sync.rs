//! Incremental folder → collection synchronization.
//!
//! A sync pass compares the file names at the top level of the data folder
//! (set A) with the distinct `source` values already stored in the
//! collection (set B) and ingests only `A − B`. Chunks are written in
//! batches of at most `batch_size` records per insert call.
//!
//! Identity is the file name alone, which has two consequences:
//! - files deleted from the folder are never pruned from the collection;
//! - a file whose content changes under the same name is not re-indexed.
//!
//! Use [`reindex_file`] to refresh a single changed file explicitly.
//!
//! Load and chunk failures are logged, recorded in the [`SyncReport`], and
//! skipped. Storage failures abort the pass; rerunning it is safe because
//! files written before the failure are skipped next time and the file that
//! was being written is rolled back (see [`add_file_chunks`]).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::chunk::ChunkParams;
use crate::config::Config;
use crate::error::{StorageError, SyncError};
use crate::extract::LoaderRegistry;
use crate::processor::{self, ProcessedDocument};
use crate::store::Collection;

/// Default maximum number of records per collection insert.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Tunables for a sync pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub chunk_params: ChunkParams,
    pub batch_size: usize,
    /// Glob patterns matched against file names; matches are ignored.
    pub exclude_globs: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            chunk_params: ChunkParams::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            exclude_globs: Vec::new(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_params: config.chunking.params(),
            batch_size: config.ingest.batch_size,
            exclude_globs: config.ingest.exclude_globs.clone(),
        }
    }
}

/// A file ingested during the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub file_name: String,
    pub chunks: usize,
}

/// A file skipped because it could not be loaded or chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub file_name: String,
    pub error: String,
}

/// Outcome of [`sync_folder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files found in the data folder (set A).
    pub data_files: usize,
    /// Files already represented in the collection (A ∩ B).
    pub already_indexed: usize,
    pub indexed: Vec<IndexedFile>,
    pub failed: Vec<FailedFile>,
    pub records_inserted: usize,
    pub batches: usize,
}

impl SyncReport {
    /// True when no file needed indexing.
    pub fn is_already_synced(&self) -> bool {
        self.indexed.is_empty() && self.failed.is_empty()
    }
}

/// Outcome of [`reindex_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexReport {
    pub file_name: String,
    pub removed: usize,
    pub inserted: usize,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SyncError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Top-level regular files of `folder`, keyed by file name.
///
/// Subdirectories are not descended into. Symlinks to files count as files.
/// Entries that cannot be inspected (dangling symlinks, permission errors)
/// are logged and skipped; only an unreadable `folder` is an error.
pub fn list_data_files(
    folder: &Path,
    exclude: &GlobSet,
) -> Result<BTreeMap<String, PathBuf>, SyncError> {
    let mut files = BTreeMap::new();

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(SyncError::Listing {
                    path: folder.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                warn!(path = ?e.path(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if exclude.is_match(&file_name) {
            debug!(file = %file_name, "excluded by glob");
            continue;
        }
        files.insert(file_name, entry.into_path());
    }

    Ok(files)
}

/// Distinct `source` values stored in the collection (set B).
pub async fn indexed_files(collection: &dyn Collection) -> Result<BTreeSet<String>, StorageError> {
    Ok(collection
        .get_metadata()
        .await?
        .into_iter()
        .map(|entry| entry.metadata.source)
        .collect())
}

/// Insert `doc` in slices of at most `batch_size` records.
///
/// Returns the number of insert calls made.
pub async fn add_in_batches(
    collection: &dyn Collection,
    doc: &ProcessedDocument,
    batch_size: usize,
) -> Result<usize, StorageError> {
    let batch_size = batch_size.max(1);
    let mut batches = 0;

    let mut start = 0;
    while start < doc.len() {
        let end = (start + batch_size).min(doc.len());
        collection
            .add(
                &doc.ids[start..end],
                &doc.chunks[start..end],
                &doc.metadatas[start..end],
            )
            .await?;
        debug!(
            collection = collection.name(),
            from = start,
            to = end,
            "inserted batch"
        );
        batches += 1;
        start = end;
    }

    Ok(batches)
}

/// [`add_in_batches`] for one file, all or nothing.
///
/// A file's batches are separate inserts. If one fails, every record of
/// `file_name` written so far is deleted again, so a half-written file never
/// counts as indexed and the next sync picks it up from scratch.
pub async fn add_file_chunks(
    collection: &dyn Collection,
    file_name: &str,
    doc: &ProcessedDocument,
    batch_size: usize,
) -> Result<usize, StorageError> {
    match add_in_batches(collection, doc, batch_size).await {
        Ok(batches) => Ok(batches),
        Err(e) => {
            match collection.delete_by_source(file_name).await {
                Ok(removed) => {
                    warn!(file = %file_name, removed, error = %e, "insert failed, rolled back file")
                }
                Err(cleanup) => {
                    error!(file = %file_name, error = %cleanup, "could not roll back partial file")
                }
            }
            Err(e)
        }
    }
}

/// Ensure every file in `folder` is represented in `collection`.
///
/// A missing folder, or one with no files, is logged and yields an empty
/// report.
pub async fn sync_folder(
    collection: &dyn Collection,
    registry: &LoaderRegistry,
    folder: &Path,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    options.chunk_params.validate()?;
    let exclude = build_globset(&options.exclude_globs)?;

    if !folder.is_dir() {
        warn!(folder = %folder.display(), "data folder does not exist, nothing to sync");
        return Ok(SyncReport::default());
    }

    let data_files = list_data_files(folder, &exclude)?;
    if data_files.is_empty() {
        warn!(folder = %folder.display(), "no files found in data folder");
        return Ok(SyncReport::default());
    }

    let indexed = indexed_files(collection).await?;
    let missing: Vec<(&String, &PathBuf)> = data_files
        .iter()
        .filter(|(name, _)| !indexed.contains(*name))
        .collect();

    let mut report = SyncReport {
        data_files: data_files.len(),
        already_indexed: data_files.len() - missing.len(),
        ..SyncReport::default()
    };

    if missing.is_empty() {
        info!(
            collection = collection.name(),
            files = data_files.len(),
            "collection already synced"
        );
        return Ok(report);
    }

    info!(
        collection = collection.name(),
        missing = missing.len(),
        "indexing new files"
    );

    for (file_name, path) in missing {
        let doc = match processor::try_process(registry, path, options.chunk_params) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file = %file_name, error = %e, "skipping document");
                report.failed.push(FailedFile {
                    file_name: file_name.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if doc.is_empty() {
            warn!(file = %file_name, "document produced no text");
        }

        report.batches += add_file_chunks(collection, file_name, &doc, options.batch_size).await?;
        report.records_inserted += doc.len();
        report.indexed.push(IndexedFile {
            file_name: file_name.clone(),
            chunks: doc.len(),
        });
    }

    info!(
        collection = collection.name(),
        indexed = report.indexed.len(),
        failed = report.failed.len(),
        records = report.records_inserted,
        "sync complete"
    );

    Ok(report)
}

/// Replace every stored chunk of one file with a fresh load of `path`.
///
/// The file is processed before anything is deleted, so a file that fails
/// to load leaves its old chunks in place. A failed insert leaves the file
/// with no records at all, pending for the next sync.
pub async fn reindex_file(
    collection: &dyn Collection,
    registry: &LoaderRegistry,
    path: &Path,
    options: &SyncOptions,
) -> Result<ReindexReport, SyncError> {
    let doc = processor::try_process(registry, path, options.chunk_params)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let removed = collection.delete_by_source(&file_name).await?;
    add_file_chunks(collection, &file_name, &doc, options.batch_size).await?;

    info!(
        file = %file_name,
        removed,
        inserted = doc.len(),
        "reindexed file"
    );

    Ok(ReindexReport {
        file_name,
        removed,
        inserted: doc.len(),
    })
}

/// Folder versus collection, without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub records: usize,
    /// Sources stored in the collection.
    pub indexed: BTreeSet<String>,
    /// Files in the folder the next sync would index.
    pub pending: Vec<String>,
    /// Indexed sources no longer present in the folder.
    pub orphaned: Vec<String>,
}

pub async fn sync_status(
    collection: &dyn Collection,
    folder: &Path,
    options: &SyncOptions,
) -> Result<SyncStatus, SyncError> {
    let exclude = build_globset(&options.exclude_globs)?;
    let data_files = if folder.is_dir() {
        list_data_files(folder, &exclude)?
    } else {
        BTreeMap::new()
    };
    let indexed = indexed_files(collection).await?;

    Ok(SyncStatus {
        records: collection.count().await?,
        pending: data_files
            .keys()
            .filter(|name| !indexed.contains(*name))
            .cloned()
            .collect(),
        orphaned: indexed
            .iter()
            .filter(|name| !data_files.contains_key(*name))
            .cloned()
            .collect(),
        indexed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ChunkMetadata;
    use crate::store::InMemoryCollection;
    use crate::testing::{KeywordEmbedder, RecordingCollection};
    use std::sync::Arc;

    fn collection() -> RecordingCollection {
        RecordingCollection::new(InMemoryCollection::new(
            "documents_collection",
            Arc::new(KeywordEmbedder::new()),
        ))
    }

    fn doc_with(n: usize) -> ProcessedDocument {
        ProcessedDocument {
            ids: (0..n).map(|i| format!("big.txt_chunk_{i}")).collect(),
            chunks: (0..n).map(|i| format!("chunk number {i}")).collect(),
            metadatas: (0..n)
                .map(|chunk_index| ChunkMetadata {
                    source: "big.txt".to_string(),
                    chunk_index,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn batches_are_capped() {
        let collection = collection();
        let calls = add_in_batches(&collection, &doc_with(250), 100)
            .await
            .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(collection.batch_sizes(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn empty_document_makes_no_calls() {
        let collection = collection();
        assert_eq!(add_in_batches(&collection, &doc_with(0), 100).await.unwrap(), 0);
        assert!(collection.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn missing_folder_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = sync_folder(
            &collection(),
            &LoaderRegistry::with_defaults(),
            &dir.path().join("nope"),
            &SyncOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn subdirectories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("inner.txt"), "inner").unwrap();
        std::fs::write(dir.path().join("top.txt"), "top level").unwrap();

        let files = list_data_files(dir.path(), &GlobSet::empty()).unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["top.txt"]);
    }

    #[tokio::test]
    async fn exclude_globs_filter_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "keep").unwrap();
        std::fs::write(dir.path().join("draft.tmp.txt"), "skip").unwrap();

        let options = SyncOptions {
            exclude_globs: vec!["*.tmp.txt".to_string()],
            ..SyncOptions::default()
        };
        let collection = collection();
        let report = sync_folder(
            &collection,
            &LoaderRegistry::with_defaults(),
            dir.path(),
            &options,
        )
        .await
        .unwrap();
        assert_eq!(report.data_files, 1);
        assert_eq!(report.indexed[0].file_name, "keep.txt");
    }

    #[tokio::test]
    async fn failures_are_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "some useful text").unwrap();
        std::fs::write(dir.path().join("sheet.csv"), "a,b,c").unwrap();

        let collection = collection();
        let report = sync_folder(
            &collection,
            &LoaderRegistry::with_defaults(),
            dir.path(),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.indexed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file_name, "sheet.csv");
        assert!(report.failed[0].error.contains(".csv"));
        assert_eq!(collection.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_chunking_fails_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "text").unwrap();
        let options = SyncOptions {
            chunk_params: ChunkParams {
                chunk_size: 10,
                overlap: 12,
            },
            ..SyncOptions::default()
        };
        let collection = collection();
        let err = sync_folder(
            &collection,
            &LoaderRegistry::with_defaults(),
            dir.path(),
            &options,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidChunking(_)));
        assert!(collection.batch_sizes().is_empty());
    }

    fn tiny_chunks() -> SyncOptions {
        SyncOptions {
            chunk_params: ChunkParams {
                chunk_size: 10,
                overlap: 0,
            },
            ..SyncOptions::default()
        }
    }

    #[tokio::test]
    async fn failed_batch_rolls_back_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(2500)).unwrap();
        let registry = LoaderRegistry::with_defaults();

        let flaky = collection().fail_after(1);
        let err = sync_folder(&flaky, &registry, dir.path(), &tiny_chunks())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(flaky.batch_sizes(), vec![100]);
        assert_eq!(flaky.count().await.unwrap(), 0);

        let healthy = RecordingCollection::new(flaky.into_inner());
        let report = sync_folder(&healthy, &registry, dir.path(), &tiny_chunks())
            .await
            .unwrap();
        assert_eq!(report.already_indexed, 0);
        assert_eq!(report.indexed[0].chunks, 250);
        assert_eq!(healthy.batch_sizes(), vec![100, 100, 50]);
        assert_eq!(healthy.count().await.unwrap(), 250);
    }

    #[tokio::test]
    async fn failed_reindex_leaves_file_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(2500)).unwrap();
        let registry = LoaderRegistry::with_defaults();

        let first = collection();
        sync_folder(&first, &registry, dir.path(), &tiny_chunks())
            .await
            .unwrap();

        let flaky = RecordingCollection::new(first.into_inner()).fail_after(1);
        assert!(reindex_file(&flaky, &registry, &path, &tiny_chunks())
            .await
            .is_err());
        assert_eq!(flaky.count().await.unwrap(), 0);

        let status = sync_status(&flaky, dir.path(), &tiny_chunks())
            .await
            .unwrap();
        assert_eq!(status.pending, vec!["big.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "still indexed").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("missing-target.txt"),
            dir.path().join("dangling.txt"),
        )
        .unwrap();

        let files = list_data_files(dir.path(), &GlobSet::empty()).unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["good.txt"]);

        let collection = collection();
        let report = sync_folder(
            &collection,
            &LoaderRegistry::with_defaults(),
            dir.path(),
            &SyncOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(report.indexed.len(), 1);
        assert_eq!(collection.count().await.unwrap(), 1);
    }

    #[test]
    fn unreadable_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_data_files(&dir.path().join("absent"), &GlobSet::empty()),
            Err(SyncError::Listing { .. })
        ));
    }

    #[tokio::test]
    async fn storage_failure_aborts_and_rerun_resumes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "first file").unwrap();
        std::fs::write(dir.path().join("b.txt"), "second file").unwrap();

        let registry = LoaderRegistry::with_defaults();
        let flaky = collection().fail_after(1);
        let err = sync_folder(&flaky, &registry, dir.path(), &SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(flaky.count().await.unwrap(), 1);

        // Retrying against the same records only writes what is missing.
        let healthy = RecordingCollection::new(flaky.into_inner());
        let report = sync_folder(&healthy, &registry, dir.path(), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.already_indexed, 1);
        assert_eq!(report.indexed.len(), 1);
        assert_eq!(report.indexed[0].file_name, "b.txt");
    }

    #[tokio::test]
    async fn reindex_replaces_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "z".repeat(1200)).unwrap();

        let collection = collection();
        let registry = LoaderRegistry::with_defaults();
        sync_folder(&collection, &registry, dir.path(), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(collection.count().await.unwrap(), 3);

        std::fs::write(&path, "short now").unwrap();
        let report = reindex_file(&collection, &registry, &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.removed, 3);
        assert_eq!(report.inserted, 1);
        assert_eq!(collection.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reindex_of_unloadable_file_keeps_old_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let collection = collection();
        let registry = LoaderRegistry::with_defaults();
        sync_folder(&collection, &registry, dir.path(), &SyncOptions::default())
            .await
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(reindex_file(&collection, &registry, &path, &SyncOptions::default())
            .await
            .is_err());
        assert_eq!(collection.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_reports_pending_and_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "old text").unwrap();

        let collection = collection();
        let registry = LoaderRegistry::with_defaults();
        sync_folder(&collection, &registry, dir.path(), &SyncOptions::default())
            .await
            .unwrap();

        std::fs::remove_file(dir.path().join("old.txt")).unwrap();
        std::fs::write(dir.path().join("new.txt"), "new text").unwrap();

        let status = sync_status(&collection, dir.path(), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(status.records, 1);
        assert_eq!(status.pending, vec!["new.txt"]);
        assert_eq!(status.orphaned, vec!["old.txt"]);
        assert!(status.indexed.contains("old.txt"));
    }
}
