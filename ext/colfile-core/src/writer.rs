//! Core writing functionality: the one-shot [`write_table`] and the
//! incremental [`ChunkedWriter`] session it is built on.

use rayon::prelude::*;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

use crate::compression::{Codec, CompressionCodec, DefaultCodec};
use crate::encoding::{encode_column_chunk, EncodedChunk};
use crate::metadata::{
    encode_footer, ColumnChunkMetadata, FileMetadata, RowGroupMetadata, FORMAT_VERSION, MAGIC,
};
use crate::schema::{Schema, TableInputMetadata};
use crate::statistics::{collect_statistics, ColumnStatistics};
use crate::{ColfileError, Column, Result, Table};

// Default configuration constants
pub const DEFAULT_MAX_ROWS_PER_ROW_GROUP: usize = 1_000_000;
pub const DEFAULT_MAX_ROW_GROUP_BYTES: usize = 128 * 1024 * 1024; // 128MB

/// How list rows that are null but still span child elements are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullListPolicy {
    /// Rewrite null list rows to empty ranges, dropping their elements
    #[default]
    Collapse,
    /// Keep the child elements of null list rows as they are
    Preserve,
}

/// Builder-style configuration for writers
#[derive(Debug, Clone)]
pub struct WriterOptions {
    compression: CompressionCodec,
    max_rows_per_row_group: usize,
    max_row_group_bytes: usize,
    null_list_policy: NullListPolicy,
    statistics: bool,
    metadata: Option<TableInputMetadata>,
    schema: Option<Schema>,
    codec: Arc<dyn Codec>,
    created_by: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::Snappy,
            max_rows_per_row_group: DEFAULT_MAX_ROWS_PER_ROW_GROUP,
            max_row_group_bytes: DEFAULT_MAX_ROW_GROUP_BYTES,
            null_list_policy: NullListPolicy::default(),
            statistics: true,
            metadata: None,
            schema: None,
            codec: Arc::new(DefaultCodec),
            created_by: Some(format!("colfile-core {}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl WriterOptions {
    /// Create options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression algorithm
    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self
    }

    /// Flush a row group once it holds this many rows
    pub fn with_max_rows_per_row_group(mut self, rows: usize) -> Self {
        self.max_rows_per_row_group = rows;
        self
    }

    /// Flush a row group once its estimated in-memory size reaches this
    pub fn with_max_row_group_bytes(mut self, bytes: usize) -> Self {
        self.max_row_group_bytes = bytes;
        self
    }

    pub fn with_null_list_policy(mut self, policy: NullListPolicy) -> Self {
        self.null_list_policy = policy;
        self
    }

    /// Enable or disable per-leaf statistics in the footer
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics = enabled;
        self
    }

    /// Column names and hints used to derive the schema from the first write
    pub fn with_metadata(mut self, metadata: TableInputMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Fix the schema up front instead of deriving it from the first write
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Replace the compression backend
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_created_by<S: Into<String>>(mut self, created_by: S) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn compression(&self) -> CompressionCodec {
        self.compression
    }

    pub fn max_rows_per_row_group(&self) -> usize {
        self.max_rows_per_row_group
    }

    pub fn max_row_group_bytes(&self) -> usize {
        self.max_row_group_bytes
    }

    fn validate(&self) -> Result<()> {
        if self.max_rows_per_row_group == 0 {
            return Err(ColfileError::invalid_argument(
                "max_rows_per_row_group must be greater than 0",
            ));
        }
        if self.max_row_group_bytes == 0 {
            return Err(ColfileError::invalid_argument(
                "max_row_group_bytes must be greater than 0",
            ));
        }
        if !self.codec.supports(self.compression) {
            return Err(ColfileError::invalid_argument(format!(
                "Codec backend does not support {}",
                self.compression
            )));
        }
        if let Some(schema) = &self.schema {
            schema.validate()?;
        }
        Ok(())
    }
}

/// Outcome of a successful [`write_table`]
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub metadata: FileMetadata,
    pub bytes_written: u64,
}

/// Write `table` as a complete file: row groups, footer and trailer
pub fn write_table<W: Write>(
    table: &Table,
    metadata: &TableInputMetadata,
    options: WriterOptions,
    sink: W,
) -> Result<WriteResult> {
    let mut writer = ChunkedWriter::open(options.with_metadata(metadata.clone()), sink)?;
    writer.write(table)?;
    writer.close()?;
    let bytes_written = writer.bytes_written();
    let metadata = writer
        .metadata()
        .cloned()
        .ok_or_else(|| ColfileError::invalid_state("Writer closed without a footer"))?;
    Ok(WriteResult {
        metadata,
        bytes_written,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Writing,
    Finalized,
    Failed,
}

/// A writing session that accepts a table in several slices.
///
/// At most one row group of pending rows is buffered; it is encoded and
/// appended to the sink as soon as either row-group threshold is reached.
pub struct ChunkedWriter<W: Write> {
    sink: W,
    options: WriterOptions,
    state: WriterState,
    schema: Option<Schema>,
    pending: Vec<Table>,
    pending_rows: usize,
    pending_bytes: usize,
    offset: u64,
    row_groups: Vec<RowGroupMetadata>,
    num_rows: u64,
    footer: Option<FileMetadata>,
}

impl<W: Write> ChunkedWriter<W> {
    /// Validate the options and write the header
    pub fn open(options: WriterOptions, mut sink: W) -> Result<Self> {
        options.validate()?;
        sink.write_all(MAGIC)?;
        Ok(Self {
            sink,
            schema: options.schema.clone(),
            options,
            state: WriterState::Open,
            pending: Vec::new(),
            pending_rows: 0,
            pending_bytes: 0,
            offset: MAGIC.len() as u64,
            row_groups: Vec::new(),
            num_rows: 0,
            footer: None,
        })
    }

    /// Append a slice of rows.
    ///
    /// The first call fixes the schema unless one was supplied up front;
    /// later slices must have the same column count and types.
    pub fn write(&mut self, table: &Table) -> Result<()> {
        self.check_writable("write")?;
        table.validate()?;

        match &self.schema {
            Some(schema) => schema.check_table(table)?,
            None => {
                let metadata = match &self.options.metadata {
                    Some(metadata) => metadata.clone(),
                    None => TableInputMetadata::from_names(
                        (0..table.num_columns()).map(|i| format!("column_{}", i)),
                    ),
                };
                let schema = Schema::from_table(table, &metadata)?;
                debug!(columns = schema.num_columns(), "schema fixed by first write");
                self.schema = Some(schema);
            }
        }

        let collapsed;
        let table = if self.options.null_list_policy == NullListPolicy::Collapse
            && table.columns().iter().any(Column::has_null_list_spans)
        {
            collapsed = Table::new(
                table
                    .columns()
                    .iter()
                    .map(Column::with_null_lists_collapsed)
                    .collect::<Result<Vec<_>>>()?,
            );
            &collapsed
        } else {
            table
        };

        self.state = WriterState::Writing;
        let rows = table.num_rows();
        let row_sizes = table.row_sizes();
        let mut start = 0;
        while start < rows {
            // a row group overshoots the byte threshold by at most its last row
            let mut end = start;
            while end < rows
                && self.pending_rows < self.options.max_rows_per_row_group
                && self.pending_bytes < self.options.max_row_group_bytes
            {
                self.pending_bytes += row_sizes[end];
                self.pending_rows += 1;
                end += 1;
            }
            self.pending.push(table.slice(start, end - start));
            start = end;

            if self.pending_rows >= self.options.max_rows_per_row_group
                || self.pending_bytes >= self.options.max_row_group_bytes
            {
                self.flush_row_group()?;
            }
        }
        Ok(())
    }

    /// Flush pending rows, write the footer and trailer.
    ///
    /// Calling `close` again after success does nothing.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Finalized => return Ok(()),
            WriterState::Failed => {
                return Err(ColfileError::invalid_state(
                    "Cannot close a writer after a failed write",
                ))
            }
            WriterState::Open | WriterState::Writing => {}
        }

        self.flush_row_group()?;

        let metadata = FileMetadata {
            version: FORMAT_VERSION,
            schema: self.schema.clone().unwrap_or_default(),
            row_groups: self.row_groups.clone(),
            num_rows: self.num_rows,
            created_by: self.options.created_by.clone(),
        };
        let footer = encode_footer(&metadata)?;
        self.append(&footer)?;
        if let Err(e) = self.sink.flush() {
            self.state = WriterState::Failed;
            return Err(e.into());
        }

        debug!(
            footer_len = footer.len(),
            row_groups = metadata.row_groups.len(),
            num_rows = metadata.num_rows,
            "wrote footer"
        );
        self.footer = Some(metadata);
        self.state = WriterState::Finalized;
        Ok(())
    }

    /// The footer, available once the writer is closed
    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.footer.as_ref()
    }

    /// Schema fixed so far, if any
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    pub fn is_closed(&self) -> bool {
        self.state == WriterState::Finalized
    }

    /// Give back the sink
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        match self.state {
            WriterState::Open | WriterState::Writing => Ok(()),
            WriterState::Finalized => Err(ColfileError::invalid_state(format!(
                "Cannot {} after the writer was closed",
                operation
            ))),
            WriterState::Failed => Err(ColfileError::invalid_state(format!(
                "Cannot {} after a failed write",
                operation
            ))),
        }
    }

    fn flush_row_group(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let parts = std::mem::take(&mut self.pending);
        self.pending_rows = 0;
        self.pending_bytes = 0;

        let result = self.encode_and_append(&parts);
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn encode_and_append(&mut self, parts: &[Table]) -> Result<()> {
        let table = Table::concat(parts)?;
        let num_rows = table.num_rows() as u64;
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| ColfileError::invalid_state("Row group pending without a schema"))?;

        let compression = self.options.compression;
        let codec = self.options.codec.as_ref();
        let with_statistics = self.options.statistics;
        let encoded = table
            .columns()
            .par_iter()
            .zip(schema.columns.par_iter())
            .map(|(column, meta)| {
                let chunk = encode_column_chunk(column, compression, codec)?;
                let statistics = if with_statistics {
                    collect_statistics(column, meta)?
                } else {
                    Vec::new()
                };
                Ok((chunk, column.memory_size() as u64, statistics))
            })
            .collect::<Result<Vec<(EncodedChunk, u64, Vec<ColumnStatistics>)>>>()?;

        let rg_offset = self.offset;
        let mut columns = Vec::with_capacity(encoded.len());
        for (chunk, decoded_size, statistics) in encoded {
            let offset = self.offset;
            self.append(&chunk.frame)?;
            columns.push(ColumnChunkMetadata {
                offset,
                compressed_size: chunk.compressed_size,
                uncompressed_size: chunk.uncompressed_size,
                codec: chunk.codec,
                num_rows,
                decoded_size,
                statistics,
            });
        }

        debug!(
            row_group = self.row_groups.len(),
            rows = num_rows,
            bytes = self.offset - rg_offset,
            "flushed row group"
        );
        self.row_groups.push(RowGroupMetadata {
            num_rows,
            offset: rg_offset,
            total_byte_size: self.offset - rg_offset,
            columns,
        });
        self.num_rows += num_rows;
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.sink.write_all(bytes) {
            self.state = WriterState::Failed;
            return Err(e.into());
        }
        self.offset += bytes.len() as u64;
        Ok(())
    }
}
