//! End-to-end tests of the bulk writer against the local filesystem sink.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bulkload::config::{WriterConfig, KB};
use bulkload::io::{ChunkSink, SinkBackend, WrittenFile};
use bulkload::types::{DataType, FieldSchema, Row, Schema, SchemaRef, DYNAMIC_FIELD_NAME};
use bulkload::{BulkWriter, CommitOptions, Error, ErrorKind, Result};
use bytes::Bytes;
use serde_json::{json, Value};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_schema(enable_dynamic_field: bool) -> SchemaRef {
    Arc::new(
        Schema::new(
            vec![
                FieldSchema::new("id", DataType::Int64).with_primary_key(false),
                FieldSchema::new("payload", DataType::VarChar).with_max_length(256),
            ],
            enable_dynamic_field,
        )
        .unwrap(),
    )
}

fn row(id: i64) -> Row {
    // Roughly 150 serialized bytes per row.
    json!({"id": id, "payload": "x".repeat(120)})
        .as_object()
        .unwrap()
        .clone()
}

fn read_rows(address: &str) -> Vec<Value> {
    let content = std::fs::read(address).unwrap();
    let container: Value = serde_json::from_slice(&content).unwrap();
    container["rows"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_blocking_commit_chunks_and_resets_buffer() {
    init_logs();

    let dir = tempfile::tempdir().unwrap();
    let config = WriterConfig {
        chunk_size: KB,
        ..Default::default()
    };
    let writer = BulkWriter::local(test_schema(false), dir.path(), config).unwrap();

    for i in 0..10_000 {
        writer.append_row(row(i)).unwrap();
    }
    assert_eq!(writer.buffer_row_count(), 10_000);

    let files = writer
        .commit(CommitOptions::blocking())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(files.len() > 1);
    assert_eq!(writer.buffer_row_count(), 0);
    assert_eq!(writer.buffer_size(), 0);
    assert_eq!(writer.batch_files().len(), files.len());

    let mut total_rows = 0;
    for file in &files {
        let rows = read_rows(&file.address);
        if rows.len() > 1 {
            assert!(std::fs::metadata(&file.address).unwrap().len() <= KB as u64);
        }
        total_rows += rows.len();
    }
    assert_eq!(total_rows, 10_000);
}

#[tokio::test]
async fn test_non_blocking_commit_defers_buffer_reset() {
    let dir = tempfile::tempdir().unwrap();
    let writer =
        BulkWriter::local(test_schema(false), dir.path(), WriterConfig::default()).unwrap();

    for i in 0..3 {
        writer.append_row(row(i)).unwrap();
    }
    let size_before = writer.buffer_size();

    let handle = writer.commit(CommitOptions::non_blocking()).await.unwrap();

    // The deferred task has not run yet on the current-thread runtime: the
    // buffer still reflects the submitted rows.
    assert!(!handle.is_ready());
    assert_eq!(writer.buffer_row_count(), 3);
    assert_eq!(writer.buffer_size(), size_before);

    let files = handle.wait().await.unwrap();
    assert_eq!(writer.buffer_row_count(), 0);
    assert_eq!(writer.buffer_size(), 0);

    let total: usize = files.iter().map(|f| read_rows(&f.address).len()).sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_empty_commit_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let writer =
        BulkWriter::local(test_schema(false), dir.path(), WriterConfig::default()).unwrap();

    for mode in [CommitOptions::blocking(), CommitOptions::non_blocking()] {
        let handle = writer.commit(mode).await.unwrap();
        assert!(handle.is_ready());
        assert!(handle.wait().await.unwrap().is_empty());
        assert!(writer.batch_files().is_empty());
    }
}

#[tokio::test]
async fn test_commit_callback_receives_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let writer =
        BulkWriter::local(test_schema(false), dir.path(), WriterConfig::default()).unwrap();
    writer.append_row(row(1)).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    writer
        .commit(CommitOptions::non_blocking().with_callback(move |files| {
            let addresses: Vec<_> = files.iter().map(|f| f.address.clone()).collect();
            tx.send(addresses).unwrap();
        }))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let addresses = rx.try_recv().unwrap();
    assert_eq!(addresses.len(), 1);
    assert!(Path::new(&addresses[0]).exists());
}

#[tokio::test]
async fn test_cleanup_relocates_local_files() {
    init_logs();

    let dir = tempfile::tempdir().unwrap();
    let config = WriterConfig {
        chunk_size: KB,
        ..Default::default()
    };
    let writer = BulkWriter::local(test_schema(false), dir.path(), config).unwrap();

    for i in 0..100 {
        writer.append_row(row(i)).unwrap();
    }
    let files = writer
        .commit(CommitOptions::blocking())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(files.len() > 1);

    writer.cleanup(false).await.unwrap();

    let base = dir.path().canonicalize().unwrap();
    for file in &files {
        let original = Path::new(&file.address);
        assert!(!original.exists());
        // The file was promoted to the parent of the working directory,
        // keeping its name.
        assert!(base.join(original.file_name().unwrap()).exists());
    }
    assert!(!base.join(writer.uuid()).exists());
    assert!(writer.batch_files().is_empty());
}

#[tokio::test]
async fn test_cleanup_disabled_keeps_files_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = WriterConfig {
        cleanup_on_exit: false,
        ..Default::default()
    };
    let writer = BulkWriter::local(test_schema(false), dir.path(), config).unwrap();

    writer.append_row(row(1)).unwrap();
    let files = writer
        .commit(CommitOptions::blocking())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    writer.cleanup(false).await.unwrap();

    assert!(Path::new(&files[0].address).exists());
    assert_eq!(writer.batch_files().len(), 1);
}

#[tokio::test]
async fn test_dynamic_fields_land_under_meta() {
    let dir = tempfile::tempdir().unwrap();
    let writer =
        BulkWriter::local(test_schema(true), dir.path(), WriterConfig::default()).unwrap();

    let mut extra = row(7);
    extra.insert("label".to_string(), json!("hot"));
    extra.insert("big".to_string(), json!(9007199254740993i64));
    writer.append_row(extra).unwrap();

    let files = writer
        .commit(CommitOptions::blocking())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let rows = read_rows(&files[0].address);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].get("label").is_none());
    let meta = &rows[0][DYNAMIC_FIELD_NAME];
    assert_eq!(meta["label"], json!("hot"));
    assert_eq!(meta["big"], json!("9007199254740993"));
}

struct UnreachableSink;

#[async_trait]
impl ChunkSink for UnreachableSink {
    async fn write(&self, _location: &str, _data: Bytes) -> Result<WrittenFile> {
        Err(Error::new(
            ErrorKind::Unexpected,
            "endpoint unreachable",
        ))
    }

    async fn cleanup(&self, _files: &[WrittenFile], _force: bool) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> SinkBackend {
        SinkBackend::Remote
    }

    fn data_path(&self) -> String {
        "s3://unreachable".to_string()
    }
}

#[tokio::test]
async fn test_storage_error_leaves_buffer_for_retry() {
    let writer = BulkWriter::new(
        test_schema(false),
        Arc::new(UnreachableSink),
        None,
        WriterConfig::default(),
    );

    for i in 0..5 {
        writer.append_row(row(i)).unwrap();
    }
    let size_before = writer.buffer_size();

    let err = writer.commit(CommitOptions::blocking()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);

    // The buffer is untouched so the same commit can be retried.
    assert_eq!(writer.buffer_row_count(), 5);
    assert_eq!(writer.buffer_size(), size_before);
    assert!(writer.batch_files().is_empty());
}

#[tokio::test]
async fn test_detached_commit_failure_keeps_buffer() {
    init_logs();

    let writer = BulkWriter::new(
        test_schema(false),
        Arc::new(UnreachableSink),
        None,
        WriterConfig::default(),
    );
    for i in 0..2 {
        writer.append_row(row(i)).unwrap();
    }

    // Drop the handle without awaiting it and let the deferred task run.
    drop(writer.commit(CommitOptions::non_blocking()).await.unwrap());
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(writer.buffer_row_count(), 2);
    assert!(writer.batch_files().is_empty());
}
