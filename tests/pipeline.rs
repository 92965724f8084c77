//! End-to-end sync, search, and reindex against a SQLite collection.

mod common;

use std::fs;

use docrag::chunk::ChunkParams;
use docrag::error::{LoadError, ProcessError};
use docrag::extract::LoaderRegistry;
use docrag::processor::try_process;
use docrag::retrieve::semantic_search;
use docrag::store::Collection;
use docrag::sync::{reindex_file, sync_folder, sync_status, SyncOptions};
use tempfile::TempDir;

use common::{filler, open_collection};

struct Env {
    _tmp: TempDir,
    data: std::path::PathBuf,
    storage: std::path::PathBuf,
}

fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    let storage = tmp.path().join("storage");
    fs::create_dir_all(&data).unwrap();
    Env {
        _tmp: tmp,
        data,
        storage,
    }
}

#[tokio::test]
async fn three_chunks_for_1050_chars() {
    let env = setup();
    fs::write(env.data.join("file.txt"), filler(1050)).unwrap();

    let collection = open_collection(&env.storage).await;
    let report = sync_folder(
        &collection,
        &LoaderRegistry::with_defaults(),
        &env.data,
        &SyncOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.indexed.len(), 1);
    assert_eq!(report.indexed[0].chunks, 3);
    assert_eq!(report.batches, 1);

    let mut entries = collection.get_metadata().await.unwrap();
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["file.txt_chunk_0", "file.txt_chunk_1", "file.txt_chunk_2"]
    );
    for entry in &entries {
        assert_eq!(entry.metadata.source, "file.txt");
        assert_eq!(
            entry.id,
            format!("file.txt_chunk_{}", entry.metadata.chunk_index)
        );
    }
}

#[tokio::test]
async fn second_sync_is_a_no_op_across_reopen() {
    let env = setup();
    fs::write(env.data.join("a.txt"), filler(700)).unwrap();
    fs::write(env.data.join("b.md"), "# Notes\n\nshort markdown").unwrap();
    let registry = LoaderRegistry::with_defaults();

    {
        let collection = open_collection(&env.storage).await;
        let first = sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.indexed.len(), 2);
        collection.close().await;
    }

    let collection = open_collection(&env.storage).await;
    let before = collection.count().await.unwrap();
    let second = sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    assert!(second.is_already_synced());
    assert_eq!(second.already_indexed, 2);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(collection.count().await.unwrap(), before);
}

#[tokio::test]
async fn only_new_files_are_indexed() {
    let env = setup();
    let registry = LoaderRegistry::with_defaults();
    fs::write(env.data.join("first.txt"), "the first document").unwrap();

    let collection = open_collection(&env.storage).await;
    sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();

    fs::write(env.data.join("second.txt"), "the second document").unwrap();
    let report = sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.already_indexed, 1);
    assert_eq!(report.indexed.len(), 1);
    assert_eq!(report.indexed[0].file_name, "second.txt");
}

#[tokio::test]
async fn removed_files_stay_in_collection() {
    let env = setup();
    let registry = LoaderRegistry::with_defaults();
    fs::write(env.data.join("gone.txt"), "soon deleted").unwrap();

    let collection = open_collection(&env.storage).await;
    sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    fs::remove_file(env.data.join("gone.txt")).unwrap();

    let report = sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.data_files, 0);
    assert_eq!(collection.count().await.unwrap(), 1);

    let status = sync_status(&collection, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(status.orphaned, vec!["gone.txt"]);
}

#[tokio::test]
async fn unsupported_format_is_reported_without_writes() {
    let env = setup();
    let path = env.data.join("table.csv");
    fs::write(&path, "a,b\n1,2").unwrap();
    let registry = LoaderRegistry::with_defaults();

    let err = try_process(&registry, &path, ChunkParams::default()).unwrap_err();
    match err {
        ProcessError::Load(LoadError::UnsupportedFormat { extension }) => {
            assert_eq!(extension, ".csv")
        }
        other => panic!("unexpected error: {other}"),
    }

    let collection = open_collection(&env.storage).await;
    let report = sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(collection.count().await.unwrap(), 0);
}

#[tokio::test]
async fn search_finds_the_relevant_file() {
    let env = setup();
    let registry = LoaderRegistry::with_defaults();
    fs::write(
        env.data.join("billing.txt"),
        "Invoices are sent monthly. Late invoices incur a five percent fee.",
    )
    .unwrap();
    fs::write(
        env.data.join("garden.txt"),
        "Tomatoes need full sun and regular watering in summer.",
    )
    .unwrap();

    let collection = open_collection(&env.storage).await;
    sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();

    let results = semantic_search(&collection, "late invoices fee", 4)
        .await
        .unwrap();
    assert_eq!(results.hits.len(), 2);
    assert_eq!(results.hits[0].metadata.source, "billing.txt");
    assert!(results.hits[0].distance <= results.hits[1].distance);
}

#[tokio::test]
async fn reindex_refreshes_changed_file() {
    let env = setup();
    let registry = LoaderRegistry::with_defaults();
    let path = env.data.join("policy.txt");
    fs::write(&path, filler(1200)).unwrap();

    let collection = open_collection(&env.storage).await;
    sync_folder(&collection, &registry, &env.data, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(collection.count().await.unwrap(), 3);

    fs::write(&path, "refunds are accepted within thirty days").unwrap();
    let report = reindex_file(&collection, &registry, &path, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.removed, 3);
    assert_eq!(report.inserted, 1);

    let results = semantic_search(&collection, "refunds", 1).await.unwrap();
    assert!(results.hits[0].document.contains("thirty days"));
}
