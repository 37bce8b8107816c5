//! Core reading functionality

use rayon::prelude::*;
use std::sync::Arc;
use tracing::trace;

use crate::compression::{Codec, DefaultCodec};
use crate::encoding::decode_column_chunk;
use crate::io::ChunkReader;
use crate::metadata::{read_metadata, FileMetadata};
use crate::schema::Schema;
use crate::{ColfileError, Column, Result, Table};

/// Column and row selection for a read
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    columns: Option<Vec<String>>,
    row_groups: Option<Vec<usize>>,
    skip_rows: usize,
    num_rows: Option<usize>,
    codec: Arc<dyn Codec>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            columns: None,
            row_groups: None,
            skip_rows: 0,
            num_rows: None,
            codec: Arc::new(DefaultCodec),
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only read the named top-level columns, in the given order
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Only read these row groups, in the given order
    pub fn with_row_groups(mut self, row_groups: Vec<usize>) -> Self {
        self.row_groups = Some(row_groups);
        self
    }

    /// Skip this many leading rows of the selected row groups
    pub fn with_skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    /// Return at most this many rows
    pub fn with_num_rows(mut self, rows: usize) -> Self {
        self.num_rows = Some(rows);
        self
    }

    /// Replace the decompression backend
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub(crate) fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }
}

/// The rows of one row group that a read needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowGroupRead {
    pub index: usize,
    pub offset: usize,
    pub len: usize,
}

/// Resolved selection: column indices plus the row groups overlapping the
/// requested row range
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReadPlan {
    pub columns: Vec<usize>,
    pub row_groups: Vec<RowGroupRead>,
}

impl ReadPlan {
    pub(crate) fn new(metadata: &FileMetadata, options: &ReaderOptions) -> Result<Self> {
        let columns = match &options.columns {
            Some(names) => metadata.resolve_columns(names)?,
            None => (0..metadata.schema.num_columns()).collect(),
        };

        let selected: Vec<usize> = match &options.row_groups {
            Some(indices) => {
                if let Some(bad) = indices.iter().find(|&&i| i >= metadata.num_row_groups()) {
                    return Err(ColfileError::invalid_argument(format!(
                        "Row group {} does not exist (file has {})",
                        bad,
                        metadata.num_row_groups()
                    )));
                }
                indices.clone()
            }
            None => (0..metadata.num_row_groups()).collect(),
        };

        let mut skip = options.skip_rows;
        let mut remaining = options.num_rows.unwrap_or(usize::MAX);
        let mut row_groups = Vec::new();
        for index in selected {
            if remaining == 0 {
                break;
            }
            let rows = metadata.row_groups[index].num_rows as usize;
            if skip >= rows {
                skip -= rows;
                continue;
            }
            let len = (rows - skip).min(remaining);
            row_groups.push(RowGroupRead {
                index,
                offset: skip,
                len,
            });
            remaining -= len;
            skip = 0;
        }

        Ok(Self {
            columns,
            row_groups,
        })
    }

    /// Estimated decoded size of one planned row group, scaled down when only
    /// part of it is read
    pub(crate) fn decoded_size(&self, metadata: &FileMetadata, read: &RowGroupRead) -> u64 {
        let full = metadata.decoded_size(read.index, &self.columns);
        let rows = metadata.row_groups[read.index].num_rows;
        if rows == 0 || read.len as u64 == rows {
            full
        } else {
            full * read.len as u64 / rows
        }
    }
}

/// Decode the selected columns of one planned row group
pub(crate) fn read_row_group<R: ChunkReader + ?Sized>(
    source: &R,
    metadata: &FileMetadata,
    columns: &[usize],
    read: &RowGroupRead,
    codec: &dyn Codec,
) -> Result<Table> {
    let row_group = metadata.row_groups.get(read.index).ok_or_else(|| {
        ColfileError::invalid_argument(format!("Row group {} does not exist", read.index))
    })?;
    trace!(
        row_group = read.index,
        columns = columns.len(),
        rows = read.len,
        "decoding row group"
    );

    let decoded = columns
        .par_iter()
        .map(|&idx| {
            let chunk = &row_group.columns[idx];
            let column_meta = &metadata.schema.columns[idx];
            let frame = source.get_bytes(chunk.offset, chunk.frame_len() as usize)?;
            let column = decode_column_chunk(&frame, chunk, &column_meta.logical_type, codec)?;
            if read.offset == 0 && read.len == column.len() {
                Ok(column)
            } else {
                Ok(column.slice(read.offset, read.len))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(decoded))
}

/// A zero-row table with the selected columns' types
pub(crate) fn empty_table(schema: &Schema, columns: &[usize]) -> Result<Table> {
    let columns = columns
        .iter()
        .map(|&idx| Column::from_values(&schema.columns[idx].logical_type, &[]))
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(columns))
}

/// Reader over any [`ChunkReader`] source; the footer is parsed once on
/// construction and shared by every read
pub struct Reader<R> {
    source: R,
    metadata: Arc<FileMetadata>,
}

impl<R: ChunkReader> Reader<R> {
    /// Create a new reader, parsing the footer
    pub fn new(source: R) -> Result<Self> {
        let metadata = Arc::new(read_metadata(&source)?);
        Ok(Self { source, metadata })
    }

    /// Get the file metadata
    pub fn metadata(&self) -> &Arc<FileMetadata> {
        &self.metadata
    }

    pub fn schema(&self) -> &Schema {
        &self.metadata.schema
    }

    pub fn num_rows(&self) -> u64 {
        self.metadata.num_rows
    }

    /// Read every column of every row group
    pub fn read(&self) -> Result<Table> {
        self.read_with_options(&ReaderOptions::default())
    }

    /// Read with column projection
    pub fn read_columns<S: AsRef<str>>(&self, columns: &[S]) -> Result<Table> {
        let options =
            ReaderOptions::default().with_columns(columns.iter().map(|c| c.as_ref().to_string()));
        self.read_with_options(&options)
    }

    /// Decode the selected row groups in order and concatenate them
    pub fn read_with_options(&self, options: &ReaderOptions) -> Result<Table> {
        let plan = ReadPlan::new(&self.metadata, options)?;
        if plan.row_groups.is_empty() {
            return empty_table(&self.metadata.schema, &plan.columns);
        }
        let tables = plan
            .row_groups
            .iter()
            .map(|read| {
                read_row_group(
                    &self.source,
                    &self.metadata,
                    &plan.columns,
                    read,
                    options.codec().as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Table::concat(&tables)
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

/// Read a whole file, optionally restricted to the named top-level columns
pub fn read_table<R: ChunkReader>(source: R, columns: Option<&[&str]>) -> Result<Table> {
    let reader = Reader::new(source)?;
    match columns {
        Some(columns) => reader.read_columns(columns),
        None => reader.read(),
    }
}
