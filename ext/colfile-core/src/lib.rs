//! Self-describing columnar container files
//!
//! `colfile-core` reads and writes tables of typed, nullable, possibly nested
//! columns to a compact binary container. A file is a sequence of row groups,
//! each holding one compressed chunk per top-level column, followed by a
//! footer that records the schema and where every chunk lives.
//!
//! # Key Components
//!
//! - **Writer**: one-shot and chunked table writers
//!   - [`write_table`] for a single call
//!   - [`ChunkedWriter`] for appending tables one slice at a time
//!   - Row groups split by row count and byte size thresholds
//!   - Uses `std::io::Write` for output flexibility
//!
//! - **Reader**: footer-driven table readers
//!   - [`read_table`] and [`Reader`] with column projection and row selection
//!   - [`ChunkedReader`] for reading a large file in memory-bounded passes
//!   - Uses [`ChunkReader`] for flexible input sources
//!
//! - **Schema**: per-column names, nullability and nested field metadata
//!   - [`TableInputMetadata`] hints supplied when writing
//!   - Schema introspection through the [`traits::SchemaInspector`] trait
//!
//! - **Columns**: in-memory [`Column`]s and [`Table`]s with validity masks,
//!   plus row access through [`Value`]
//!
//! - **Arrow Conversion**: bidirectional conversion between Arrow record
//!   batches and tables
//!
//! # Example Usage
//!
//! ```
//! use bytes::Bytes;
//! use colfile_core::{read_table, write_table, Column, Table, TableInputMetadata, WriterOptions};
//!
//! let table = Table::try_new(vec![
//!     Column::int64(vec![1, 2, 3]),
//!     Column::strings(["a", "b", "c"])?,
//! ])?;
//!
//! let mut file = Vec::new();
//! write_table(
//!     &table,
//!     &TableInputMetadata::from_names(["id", "label"]),
//!     WriterOptions::default(),
//!     &mut file,
//! )?;
//!
//! let read = read_table(Bytes::from(file), None)?;
//! assert_eq!(read, table);
//! # Ok::<(), colfile_core::ColfileError>(())
//! ```

pub mod arrow_conversion;
pub mod bitmap;
pub mod chunked_reader;
pub mod column;
pub mod compression;
pub mod encoding;
pub mod error;
pub mod io;
pub mod metadata;
pub mod reader;
pub mod schema;
pub mod statistics;
pub mod table;
pub mod traits;
pub mod types;
pub mod value;
pub mod writer;

#[cfg(test)]
pub mod test_utils;

pub use bitmap::Bitmap;
pub use chunked_reader::ChunkedReader;
pub use column::{Column, ColumnData, DecimalData, ListData, StringData, StructData};
pub use compression::{Codec, CompressionCodec, DefaultCodec};
pub use error::{ColfileError, ErrorContext, ErrorKind, Result};
pub use io::{ChunkReader, FileChunkReader};
pub use metadata::{read_metadata, ColumnChunkMetadata, FileMetadata, RowGroupMetadata};
pub use reader::{read_table, Reader, ReaderOptions};
pub use schema::{
    ColumnInMetadata, ColumnMetadata, Schema, SchemaBuilder, TableInputMetadata,
};
pub use statistics::{ColumnStatistics, StatValue};
pub use table::Table;
pub use types::{Decimal, LogicalType, StructField};
pub use value::Value;
pub use writer::{write_table, ChunkedWriter, NullListPolicy, WriteResult, WriterOptions};
