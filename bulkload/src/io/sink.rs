//! A module provide storage sinks: the durable destinations chunks are
//! written to. Both sinks are backed by an [`opendal::Operator`], the local
//! one rooted at the configured base directory, the remote one speaking to
//! an S3-compatible endpoint.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use opendal::{Operator, Scheme};

use crate::{Error, ErrorKind, Result};

/// Operator args: root
const OP_ARGS_ROOT: &str = "root";
/// Operator args: bucket
const OP_ARGS_BUCKET: &str = "bucket";
/// s3 endpoint
const OP_ARGS_ENDPOINT: &str = "endpoint";
/// s3 region
const OP_ARGS_REGION: &str = "region";
/// s3 access key
const OP_ARGS_ACCESS_KEY: &str = "access_key_id";
/// s3 access secret
const OP_ARGS_ACCESS_SECRET: &str = "secret_access_key";

const DEFAULT_REGION: &str = "us-east-1";

/// Storage backend of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBackend {
    /// Local filesystem.
    Local,
    /// S3-compatible object store.
    Remote,
}

/// One durably written chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// User-facing address: an absolute filesystem path or an
    /// `s3://bucket/key` URI, handed to the subsequent bulk-import call.
    pub address: String,
    /// Operator-relative location, used for cleanup.
    pub location: String,
}

/// ChunkSink durably writes serialized chunks and disposes of them at the
/// end of the writer's lifecycle.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Write one chunk at the given relative location and return its
    /// address. Failures abort the in-flight commit; there is no retry.
    async fn write(&self, location: &str, data: Bytes) -> Result<WrittenFile>;

    /// Dispose of previously written files. Semantics are backend
    /// specific, see [`LocalSink`] and [`RemoteSink`].
    async fn cleanup(&self, files: &[WrittenFile], force: bool) -> Result<()>;

    /// The backend of this sink.
    fn backend(&self) -> SinkBackend;

    /// The base path all locations are relative to.
    fn data_path(&self) -> String;
}

/// Local filesystem sink. Chunks land under
/// `<base path>/<writer namespace>/`.
pub struct LocalSink {
    operator: Operator,
    base_path: PathBuf,
}

impl LocalSink {
    /// Create a sink rooted at `base_path`, creating the directory if
    /// absent.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            Error::new(ErrorKind::Unexpected, "create base directory failed")
                .with_context("path", base_path.display().to_string())
                .set_source(e)
        })?;
        // Canonicalize so that returned addresses are absolute.
        let base_path = base_path.canonicalize().map_err(|e| {
            Error::new(ErrorKind::Unexpected, "canonicalize base directory failed")
                .with_context("path", base_path.display().to_string())
                .set_source(e)
        })?;

        let operator = Operator::via_map(
            Scheme::Fs,
            HashMap::from([(
                OP_ARGS_ROOT.to_string(),
                base_path.to_string_lossy().to_string(),
            )]),
        )?;

        Ok(Self {
            operator,
            base_path,
        })
    }
}

#[async_trait]
impl ChunkSink for LocalSink {
    async fn write(&self, location: &str, data: Bytes) -> Result<WrittenFile> {
        self.operator.write(location, data).await?;

        Ok(WrittenFile {
            address: format!("{}/{}", self.base_path.display(), location),
            location: location.to_string(),
        })
    }

    /// Relocate every written file to the parent of the writer's namespace
    /// directory, then remove the now-empty directory.
    ///
    /// The two steps stay observable: when some files fail to move, the
    /// directory removal fails and propagates, leaving the partial state on
    /// disk for inspection.
    async fn cleanup(&self, files: &[WrittenFile], _force: bool) -> Result<()> {
        let mut namespaces = Vec::new();

        for file in files {
            let Some((namespace, name)) = file.location.rsplit_once('/') else {
                continue;
            };
            let promoted = match namespace.rsplit_once('/') {
                Some((parent, _)) => format!("{parent}/{name}"),
                None => name.to_string(),
            };

            if let Err(err) = rename(&self.operator, &file.location, &promoted).await {
                log::warn!("failed to relocate {}: {err}", file.location);
            }
            if !namespaces.contains(&namespace.to_string()) {
                namespaces.push(namespace.to_string());
            }
        }

        for namespace in namespaces {
            self.operator.delete(&format!("{namespace}/")).await?;
        }

        Ok(())
    }

    fn backend(&self) -> SinkBackend {
        SinkBackend::Local
    }

    fn data_path(&self) -> String {
        self.base_path.display().to_string()
    }
}

async fn rename(op: &Operator, src_path: &str, dest_path: &str) -> Result<()> {
    let info = op.info();
    if info.full_capability().rename {
        Ok(op.rename(src_path, dest_path).await?)
    } else {
        op.copy(src_path, dest_path).await?;
        op.delete(src_path).await?;
        Ok(())
    }
}

/// Connection parameters of an S3-compatible endpoint. Supplied at sink
/// construction; there is no retry on failure.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint of the S3 service.
    pub endpoint: String,
    /// Region, defaults to `us-east-1` when unset.
    pub region: Option<String>,
    /// Destination bucket.
    pub bucket: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// S3-compatible object store sink. Chunks land under
/// `s3://<bucket>/<remote prefix>/<writer namespace>/`.
pub struct RemoteSink {
    operator: Operator,
    bucket: String,
}

impl RemoteSink {
    /// Create a sink for the given S3 connection parameters.
    pub fn new(config: S3Config) -> Result<Self> {
        let operator = Operator::via_map(
            Scheme::S3,
            HashMap::from([
                (OP_ARGS_ROOT.to_string(), "/".to_string()),
                (OP_ARGS_BUCKET.to_string(), config.bucket.clone()),
                (OP_ARGS_ENDPOINT.to_string(), config.endpoint),
                (
                    OP_ARGS_REGION.to_string(),
                    config.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
                ),
                (OP_ARGS_ACCESS_KEY.to_string(), config.access_key_id),
                (OP_ARGS_ACCESS_SECRET.to_string(), config.secret_access_key),
            ]),
        )?;

        Ok(Self {
            operator,
            bucket: config.bucket,
        })
    }

    /// Create a sink over an existing operator. Useful for tests and for
    /// object stores opendal supports beyond s3.
    pub fn with_operator(operator: Operator, bucket: impl Into<String>) -> Self {
        Self {
            operator,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ChunkSink for RemoteSink {
    async fn write(&self, location: &str, data: Bytes) -> Result<WrittenFile> {
        self.operator.write(location, data).await?;

        Ok(WrittenFile {
            address: format!("s3://{}/{}", self.bucket, location),
            location: location.to_string(),
        })
    }

    /// Delete the written objects, best effort: failures of individual
    /// deletions are logged and skipped so cleanup keeps making progress.
    /// A no-op unless `force` is set, so artifacts stay available for the
    /// import by default.
    async fn cleanup(&self, files: &[WrittenFile], force: bool) -> Result<()> {
        if !force {
            return Ok(());
        }

        for file in files {
            if let Err(err) = self.operator.delete(&file.location).await {
                log::warn!("failed to delete {}: {err}", file.address);
            }
        }

        Ok(())
    }

    fn backend(&self) -> SinkBackend {
        SinkBackend::Remote
    }

    fn data_path(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
