//! types module provides the schema descriptor consumed by the writer and
//! the row normalization built on top of it.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::{Error, ErrorKind, Result};

mod schema;
pub use schema::DataType;
pub use schema::FieldSchema;
pub use schema::Schema;
pub use schema::SchemaRef;
pub use schema::DYNAMIC_FIELD_NAME;

mod row;
pub use row::estimate_row_size;
pub use row::Row;
pub use row::RowNormalizer;

/// File format used to encode one chunk of rows.
///
/// Only the row-oriented JSON container is implemented. The other formats
/// are reserved and rejected with [`ErrorKind::FeatureUnsupported`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum FileFormat {
    /// JSON row container: `{"rows": [...]}`.
    #[default]
    Json,
    /// CSV file format, reserved.
    Csv,
    /// Parquet file format, reserved.
    Parquet,
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            _ => Err(Error::new(
                ErrorKind::FeatureUnsupported,
                format!("Unsupported file format: {}", s),
            )),
        }
    }
}

impl Display for FileFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Json => f.write_str("json"),
            FileFormat::Csv => f.write_str("csv"),
            FileFormat::Parquet => f.write_str("parquet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_roundtrip() {
        for s in ["json", "csv", "parquet"] {
            let format = FileFormat::from_str(s).unwrap();
            assert_eq!(format.to_string(), s);
        }

        assert_eq!(
            FileFormat::from_str("numpy").unwrap_err().kind(),
            ErrorKind::FeatureUnsupported
        );
    }
}
