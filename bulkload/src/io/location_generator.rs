//! location_generator is used to generate a relative file location for
//! each chunk written by one writer instance.

use std::sync::atomic::AtomicUsize;

use crate::types::FileFormat;

/// FileLocationGenerator will generate a file location for each chunk.
///
/// Locations live under the writer's private namespace
/// (`[prefix/]<writer id>/`) and are indexed by a monotonically increasing
/// sequence number, so chunks written from the same commit can never
/// collide, sequentially or concurrently.
pub struct FileLocationGenerator {
    file_count: AtomicUsize,
    writer_id: String,
    prefix: Option<String>,
    file_format: FileFormat,
}

impl FileLocationGenerator {
    /// Create a generator for the given writer namespace. `prefix` is the
    /// remote key prefix and is unused on the local backend.
    pub fn new(writer_id: impl Into<String>, prefix: Option<String>, file_format: FileFormat) -> Self {
        Self {
            file_count: AtomicUsize::new(0),
            writer_id: writer_id.into(),
            prefix: prefix.filter(|p| !p.is_empty()),
            file_format,
        }
    }

    /// The namespace all generated locations live under.
    pub fn namespace(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, self.writer_id),
            None => self.writer_id.clone(),
        }
    }

    /// Generate the location of the next chunk.
    pub fn generate_name(&self) -> String {
        let seq = self
            .file_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;

        format!("{}/{:05}.{}", self.namespace(), seq, self.file_format)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_location_generator_sequence() {
        let generator = FileLocationGenerator::new("wid", None, FileFormat::Json);
        assert_eq!(generator.generate_name(), "wid/00001.json");
        assert_eq!(generator.generate_name(), "wid/00002.json");
        assert_eq!(generator.namespace(), "wid");
    }

    #[test]
    fn test_location_generator_with_prefix() {
        let generator =
            FileLocationGenerator::new("wid", Some("imports/orders".to_string()), FileFormat::Json);
        assert_eq!(generator.generate_name(), "imports/orders/wid/00001.json");
        assert_eq!(generator.namespace(), "imports/orders/wid");
    }
}
