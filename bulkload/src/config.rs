//! This module contains writer configurations.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::Result;
use crate::types::FileFormat;
use crate::{Error, ErrorKind};

/// 1 KiB in bytes.
pub const KB: usize = 1024;
/// 1 MiB in bytes.
pub const MB: usize = 1024 * KB;
/// 1 GiB in bytes.
pub const GB: usize = 1024 * MB;

/// Writer configuration.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct WriterConfig {
    /// Byte budget of one serialized chunk. A chunk holding more than one
    /// row never exceeds it; a single oversized row still forms its own
    /// one-row chunk.
    pub chunk_size: usize,
    /// Encoding of the chunk container.
    pub file_format: FileFormat,
    /// Validate value types against the schema on append. When disabled the
    /// writer performs no type coercion and accepts values as given.
    pub strict_validation: bool,
    /// Skip rows failing validation instead of raising an error.
    pub skip_invalid_rows: bool,
    /// Cleanup policy of the local backend: when enabled, `cleanup` promotes
    /// written files out of the per-writer working directory and removes it.
    pub cleanup_on_exit: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128 * MB,
            file_format: FileFormat::Json,
            strict_validation: false,
            skip_invalid_rows: false,
            cleanup_on_exit: true,
        }
    }
}

impl TryFrom<&'_ HashMap<String, String>> for WriterConfig {
    type Error = Error;

    fn try_from(value: &'_ HashMap<String, String>) -> Result<Self> {
        let mut config = WriterConfig::default();

        value
            .get("bulkload.writer.chunk_size")
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::Unexpected,
                    "Can't parse bulkload.writer.chunk_size.",
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.chunk_size = *v);

        value
            .get("bulkload.writer.file_format")
            .map(|v| FileFormat::from_str(v))
            .transpose()?
            .iter()
            .for_each(|v| config.file_format = *v);

        value
            .get("bulkload.writer.strict_validation")
            .map(|v| v.parse::<bool>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::Unexpected,
                    "Can't parse bulkload.writer.strict_validation.",
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.strict_validation = *v);

        value
            .get("bulkload.writer.skip_invalid_rows")
            .map(|v| v.parse::<bool>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::Unexpected,
                    "Can't parse bulkload.writer.skip_invalid_rows.",
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.skip_invalid_rows = *v);

        value
            .get("bulkload.writer.cleanup_on_exit")
            .map(|v| v.parse::<bool>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::Unexpected,
                    "Can't parse bulkload.writer.cleanup_on_exit.",
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.cleanup_on_exit = *v);

        Ok(config)
    }
}
