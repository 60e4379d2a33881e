//! io module provides the ability to buffer rows, split them into
//! size-bounded chunks and write the chunks to various storage backends.

pub mod chunk;
pub mod location_generator;
pub mod row_buffer;
pub mod sink;

pub use chunk::serialize_chunks;
pub use chunk::Chunk;
pub use location_generator::FileLocationGenerator;
pub use row_buffer::RowBuffer;
pub use sink::ChunkSink;
pub use sink::LocalSink;
pub use sink::RemoteSink;
pub use sink::S3Config;
pub use sink::SinkBackend;
pub use sink::WrittenFile;
