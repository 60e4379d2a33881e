//! writer module provides `BulkWriter`: it owns the row buffer and the
//! cumulative batch-file list of one writer instance and coordinates
//! buffer -> chunks -> sink for every commit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::WriterConfig;
use crate::io::{
    serialize_chunks, ChunkSink, FileLocationGenerator, LocalSink, RemoteSink, RowBuffer,
    S3Config, SinkBackend, WrittenFile,
};
use crate::types::{FileFormat, Row, RowNormalizer, SchemaRef};
use crate::{Error, ErrorKind, Result};

/// Callback fired with the newly written files once a commit completes.
pub type CommitCallback = Box<dyn FnOnce(&[WrittenFile]) + Send + 'static>;

/// Commit execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Serialize and write within the commit call; the buffer is observably
    /// empty when the call returns.
    #[default]
    Blocking,
    /// Defer all serialize/write work past the call boundary; the call
    /// returns a pending handle almost immediately and the buffer keeps
    /// reflecting the submitted rows until the handle resolves.
    NonBlocking,
}

/// Options of one commit invocation.
#[derive(Default)]
pub struct CommitOptions {
    /// Commit execution mode.
    pub mode: CommitMode,
    callback: Option<CommitCallback>,
}

impl CommitOptions {
    /// Blocking commit, no callback.
    pub fn blocking() -> Self {
        Self::default()
    }

    /// Non-blocking commit, no callback.
    pub fn non_blocking() -> Self {
        Self {
            mode: CommitMode::NonBlocking,
            callback: None,
        }
    }

    /// Fire `callback` with the newly written files once the commit
    /// completes.
    pub fn with_callback(mut self, callback: impl FnOnce(&[WrittenFile]) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

#[derive(Debug)]
enum HandleState {
    Ready(Vec<WrittenFile>),
    Pending(JoinHandle<Result<Vec<WrittenFile>>>),
}

/// Handle of one commit invocation.
///
/// A blocking commit returns an already resolved handle; a non-blocking
/// commit returns a pending one. Once [`CommitHandle::wait`] returns, the
/// buffer has been reset, the batch-file list extended and the callback
/// fired.
#[derive(Debug)]
pub struct CommitHandle {
    state: HandleState,
}

impl CommitHandle {
    fn ready(files: Vec<WrittenFile>) -> Self {
        Self {
            state: HandleState::Ready(files),
        }
    }

    fn pending(handle: JoinHandle<Result<Vec<WrittenFile>>>) -> Self {
        Self {
            state: HandleState::Pending(handle),
        }
    }

    /// Whether the commit already completed.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Wait for the commit to complete and return the written files.
    pub async fn wait(self) -> Result<Vec<WrittenFile>> {
        match self.state {
            HandleState::Ready(files) => Ok(files),
            HandleState::Pending(handle) => handle.await.map_err(|e| {
                Error::new(ErrorKind::Unexpected, "deferred commit task failed")
                    .set_source(e)
            })?,
        }
    }
}

/// The deferred part of one commit: serialize the snapshot, write every
/// chunk, then update the writer state. Shared by both commit modes.
struct FlushTask {
    sink: Arc<dyn ChunkSink>,
    location_generator: Arc<FileLocationGenerator>,
    buffer: Arc<Mutex<RowBuffer>>,
    batch_files: Arc<Mutex<Vec<WrittenFile>>>,
    rows: Vec<Row>,
    chunk_size: usize,
    file_format: FileFormat,
    callback: Option<CommitCallback>,
}

impl FlushTask {
    async fn run(self) -> Result<Vec<WrittenFile>> {
        log::debug!("serializing {} buffered rows into chunks", self.rows.len());
        let chunks = serialize_chunks(&self.rows, self.chunk_size, self.file_format)?;

        // A storage failure returns here and leaves the buffer unmodified,
        // so the caller may retry the same commit.
        let mut written = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let location = self.location_generator.generate_name();
            let file = match self.sink.write(&location, chunk.data).await {
                Ok(file) => file,
                Err(err) => {
                    // A deferred commit may never be awaited, so a failed
                    // flush is reported here as well as through the handle.
                    log::error!("commit aborted, writing chunk {location} failed: {err}");
                    return Err(err);
                }
            };
            log::debug!("wrote chunk of {} rows to {}", chunk.row_count, file.address);
            written.push(file);
        }

        self.batch_files
            .lock()
            .expect("batch file list lock poisoned")
            .extend(written.iter().cloned());
        self.buffer
            .lock()
            .expect("row buffer lock poisoned")
            .reset();

        if let Some(callback) = self.callback {
            callback(&written);
        }

        Ok(written)
    }
}

/// A bulk data writer bound to one schema and one storage sink.
///
/// The writer accumulates normalized rows in memory; `commit` partitions
/// them into size-bounded chunks and durably writes each chunk through the
/// sink, extending the cumulative batch-file list with the new addresses.
/// One writer instance is driven by a single logical task; commits must not
/// overlap.
pub struct BulkWriter {
    schema: SchemaRef,
    config: WriterConfig,
    normalizer: RowNormalizer,
    writer_id: String,

    buffer: Arc<Mutex<RowBuffer>>,
    batch_files: Arc<Mutex<Vec<WrittenFile>>>,
    sink: Arc<dyn ChunkSink>,
    location_generator: Arc<FileLocationGenerator>,

    total_rows: AtomicUsize,
    skipped_rows: AtomicUsize,
}

impl BulkWriter {
    /// Create a writer over an arbitrary sink. `prefix` is the key prefix
    /// written files live under, inside the writer's private namespace.
    pub fn new(
        schema: SchemaRef,
        sink: Arc<dyn ChunkSink>,
        prefix: Option<String>,
        config: WriterConfig,
    ) -> Self {
        let writer_id = Uuid::new_v4().to_string();
        let normalizer = RowNormalizer::new(
            schema.clone(),
            config.strict_validation,
            config.skip_invalid_rows,
        );
        let location_generator = Arc::new(FileLocationGenerator::new(
            writer_id.clone(),
            prefix,
            config.file_format,
        ));

        Self {
            schema,
            config,
            normalizer,
            writer_id,
            buffer: Arc::new(Mutex::new(RowBuffer::new())),
            batch_files: Arc::new(Mutex::new(Vec::new())),
            sink,
            location_generator,
            total_rows: AtomicUsize::new(0),
            skipped_rows: AtomicUsize::new(0),
        }
    }

    /// Create a writer that persists chunks under `base_path` on the local
    /// filesystem, creating the directory if absent.
    pub fn local(
        schema: SchemaRef,
        base_path: impl Into<PathBuf>,
        config: WriterConfig,
    ) -> Result<Self> {
        let sink = Arc::new(LocalSink::new(base_path)?);
        Ok(Self::new(schema, sink, None, config))
    }

    /// Create a writer that persists chunks as objects under
    /// `remote_prefix` in the configured bucket of an S3-compatible store.
    pub fn remote(
        schema: SchemaRef,
        s3: S3Config,
        remote_prefix: impl Into<String>,
        config: WriterConfig,
    ) -> Result<Self> {
        let sink = Arc::new(RemoteSink::new(s3)?);
        Ok(Self::new(schema, sink, Some(remote_prefix.into()), config))
    }

    /// Normalize one row against the schema and append it to the buffer.
    ///
    /// Rows rejected under the skip-invalid-rows policy are counted in
    /// [`BulkWriter::skipped_rows`] and leave the buffer untouched. Appends
    /// never suspend.
    pub fn append_row(&self, row: Row) -> Result<()> {
        match self.normalizer.normalize(&row)? {
            Some(normalized) => {
                self.buffer
                    .lock()
                    .expect("row buffer lock poisoned")
                    .append(normalized);
                self.total_rows.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.skipped_rows.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Commit the buffered rows: serialize them into chunks at or under the
    /// configured chunk size and write every chunk through the sink.
    ///
    /// A commit with an empty buffer writes nothing and returns an already
    /// resolved handle. A blocking commit resets the buffer before
    /// returning; a non-blocking one defers all work into a spawned task
    /// and resets the buffer only when that task finishes, so the buffer
    /// keeps reflecting the pending rows in between. Callers must not start
    /// a second commit before a prior one completed.
    pub async fn commit(&self, options: CommitOptions) -> Result<CommitHandle> {
        let rows = self
            .buffer
            .lock()
            .expect("row buffer lock poisoned")
            .snapshot();
        if rows.is_empty() {
            log::debug!("commit with an empty buffer is a no-op");
            return Ok(CommitHandle::ready(Vec::new()));
        }

        let task = FlushTask {
            sink: self.sink.clone(),
            location_generator: self.location_generator.clone(),
            buffer: self.buffer.clone(),
            batch_files: self.batch_files.clone(),
            rows,
            chunk_size: self.config.chunk_size,
            file_format: self.config.file_format,
            callback: options.callback,
        };

        match options.mode {
            CommitMode::Blocking => Ok(CommitHandle::ready(task.run().await?)),
            CommitMode::NonBlocking => Ok(CommitHandle::pending(tokio::spawn(task.run()))),
        }
    }

    /// Dispose of the writer's artifacts and working state.
    ///
    /// Local backend: a no-op while the cleanup policy is disabled (unless
    /// forced); otherwise every written file is promoted out of the
    /// per-writer working directory into the base path and the directory is
    /// removed. Remote backend: a no-op unless forced; forced cleanup
    /// deletes the written objects best effort. The batch-file list is
    /// cleared whenever cleanup ran. Never errors for a writer that wrote
    /// nothing.
    pub async fn cleanup(&self, force: bool) -> Result<()> {
        match self.sink.backend() {
            SinkBackend::Local => {
                if !self.config.cleanup_on_exit && !force {
                    return Ok(());
                }
            }
            SinkBackend::Remote => {
                if !force {
                    return Ok(());
                }
            }
        }

        let files = self
            .batch_files
            .lock()
            .expect("batch file list lock poisoned")
            .clone();
        if files.is_empty() {
            return Ok(());
        }

        self.sink.cleanup(&files, force).await?;
        self.batch_files
            .lock()
            .expect("batch file list lock poisoned")
            .clear();

        log::debug!("writer {} cleaned up {} files", self.writer_id, files.len());
        Ok(())
    }

    /// The schema this writer validates rows against.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Unique identifier of this writer instance, used as its isolation
    /// namespace under the base path or remote prefix.
    pub fn uuid(&self) -> &str {
        &self.writer_id
    }

    /// The directory or URI all chunks of this writer land under.
    pub fn data_path(&self) -> String {
        format!(
            "{}/{}",
            self.sink.data_path(),
            self.location_generator.namespace()
        )
    }

    /// Estimated serialized size of the buffered rows, in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer.lock().expect("row buffer lock poisoned").size()
    }

    /// Number of buffered rows.
    pub fn buffer_row_count(&self) -> usize {
        self.buffer.lock().expect("row buffer lock poisoned").count()
    }

    /// Total number of rows accepted by this writer.
    pub fn total_rows(&self) -> usize {
        self.total_rows.load(Ordering::Relaxed)
    }

    /// Number of rows skipped by the validation policy.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows.load(Ordering::Relaxed)
    }

    /// All files written by this writer so far.
    pub fn batch_files(&self) -> Vec<WrittenFile> {
        self.batch_files
            .lock()
            .expect("batch file list lock poisoned")
            .clone()
    }
}
