//! A module provide the chunk serializer: it splits buffered rows into
//! size-bounded chunks and encodes each chunk as a self-describing row
//! container.

use bytes::Bytes;
use serde::Serialize;

use crate::types::{FileFormat, Row};
use crate::{Error, ErrorKind, Result};

/// Serialized size of the empty container `{"rows":[]}`.
const CONTAINER_OVERHEAD: usize = 11;

/// One serialized chunk, at or under the configured byte budget except for
/// the single-oversized-row case.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Encoded chunk bytes.
    pub data: Bytes,
    /// Number of rows held by this chunk.
    pub row_count: usize,
}

#[derive(Serialize)]
struct RowContainer<'a> {
    rows: &'a [Row],
}

/// Split `rows` into chunks whose encoded size stays at or under
/// `chunk_size`, walking the rows in insertion order.
///
/// Packing is greedy: the current chunk is sealed when the next row would
/// push it over budget and it already holds at least one row. A single row
/// whose own encoded size exceeds the budget still forms its own one-row
/// chunk, so the algorithm always makes progress and never drops a row.
/// Zero rows yield zero chunks.
pub fn serialize_chunks(rows: &[Row], chunk_size: usize, format: FileFormat) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    if rows.is_empty() {
        return Ok(chunks);
    }

    let mut start = 0;
    // Encoded bytes of rows[start..idx] including separating commas.
    let mut body = 0;
    for (idx, row) in rows.iter().enumerate() {
        let encoded = serde_json::to_vec(row)?.len();
        if idx > start && CONTAINER_OVERHEAD + body + 1 + encoded > chunk_size {
            chunks.push(seal(&rows[start..idx], format)?);
            start = idx;
            body = encoded;
        } else if idx > start {
            body += 1 + encoded;
        } else {
            body = encoded;
        }
    }
    chunks.push(seal(&rows[start..], format)?);

    Ok(chunks)
}

fn seal(rows: &[Row], format: FileFormat) -> Result<Chunk> {
    let data = match format {
        FileFormat::Json => serde_json::to_vec(&RowContainer { rows })?,
        _ => {
            return Err(Error::new(
                ErrorKind::FeatureUnsupported,
                format!("file format {format} is reserved and not implemented"),
            ));
        }
    };

    Ok(Chunk {
        data: Bytes::from(data),
        row_count: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn rows_of(n: usize, payload: &str) -> Vec<Row> {
        (0..n)
            .map(|i| {
                json!({"id": i, "payload": payload})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    #[test]
    fn test_empty_buffer_yields_zero_chunks() {
        let chunks = serialize_chunks(&[], 1024, FileFormat::Json).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunks_respect_budget_and_conserve_rows() {
        let rows = rows_of(100, "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx");
        let budget = 256;
        let chunks = serialize_chunks(&rows, budget, FileFormat::Json).unwrap();

        assert!(chunks.len() > 1);
        let total: usize = chunks.iter().map(|c| c.row_count).sum();
        assert_eq!(total, 100);

        for chunk in &chunks {
            if chunk.row_count > 1 {
                assert!(chunk.data.len() <= budget);
            }
        }
    }

    #[test]
    fn test_oversized_row_forms_its_own_chunk() {
        let rows = rows_of(3, &"y".repeat(2048));
        let chunks = serialize_chunks(&rows, 1024, FileFormat::Json).unwrap();

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.row_count, 1);
            assert!(chunk.data.len() > 1024);
        }
    }

    #[test]
    fn test_container_shape_and_row_order() {
        let rows = rows_of(5, "payload");
        let chunks = serialize_chunks(&rows, usize::MAX, FileFormat::Json).unwrap();
        assert_eq!(chunks.len(), 1);

        let decoded: Value = serde_json::from_slice(&chunks[0].data).unwrap();
        let decoded_rows = decoded["rows"].as_array().unwrap();
        assert_eq!(decoded_rows.len(), 5);
        for (i, row) in decoded_rows.iter().enumerate() {
            assert_eq!(row["id"], json!(i));
        }
    }

    #[test]
    fn test_container_overhead_constant_matches_encoding() {
        let empty: Vec<Row> = vec![];
        let encoded = serde_json::to_vec(&RowContainer { rows: &empty }).unwrap();
        assert_eq!(encoded.len(), CONTAINER_OVERHEAD);
    }

    #[test]
    fn test_reserved_formats_are_rejected() {
        let rows = rows_of(1, "p");
        let err = serialize_chunks(&rows, 1024, FileFormat::Parquet).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureUnsupported);
    }
}
