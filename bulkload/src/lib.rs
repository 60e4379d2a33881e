//! bulkload is a client-side bulk data writer: it buffers application rows
//! in memory, splits them into size-bounded chunks, serializes each chunk as
//! a self-describing row container and persists the chunks to a local
//! filesystem or an S3-compatible object store, collecting the list of
//! written file locations for a subsequent server-side bulk-import call.

// Make sure all our public APIs have docs.
#![deny(missing_docs)]

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

pub mod config;
pub mod io;
pub mod types;

mod writer;
pub use writer::BulkWriter;
pub use writer::CommitHandle;
pub use writer::CommitMode;
pub use writer::CommitOptions;
