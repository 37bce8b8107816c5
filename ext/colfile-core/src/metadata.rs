//! File footer: the serialized description of every row group and column
//! chunk, followed by a fixed eight byte trailer.
//!
//! ```text
//! "CLF1" | row group 0 | ... | row group N | footer (JSON) | u32 footer_len | "CLF1"
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compression::CompressionCodec;
use crate::io::ChunkReader;
use crate::schema::{ColumnMetadata, Schema};
use crate::statistics::ColumnStatistics;
use crate::{ColfileError, Result};

/// Magic bytes at the start and end of every file
pub const MAGIC: &[u8; 4] = b"CLF1";

/// Footer length plus trailing magic
pub const TRAILER_LEN: usize = 8;

pub const FORMAT_VERSION: u32 = 1;

/// Frame header in front of every chunk payload: uncompressed length,
/// compressed length, codec id
pub const CHUNK_HEADER_LEN: usize = 9;

/// Everything the footer records about a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub version: u32,
    pub schema: Schema,
    pub row_groups: Vec<RowGroupMetadata>,
    pub num_rows: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// One independently decodable horizontal slice of the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowGroupMetadata {
    pub num_rows: u64,
    /// Offset of the first chunk frame
    pub offset: u64,
    /// Total bytes of all chunk frames
    pub total_byte_size: u64,
    /// One entry per top-level column
    pub columns: Vec<ColumnChunkMetadata>,
}

/// Location and description of one top-level column's framed chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChunkMetadata {
    /// Offset of the frame header
    pub offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub codec: CompressionCodec,
    pub num_rows: u64,
    /// Estimated in-memory size of the decoded column
    pub decoded_size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statistics: Vec<ColumnStatistics>,
}

impl ColumnChunkMetadata {
    /// Bytes occupied by the frame, header included
    pub fn frame_len(&self) -> u64 {
        CHUNK_HEADER_LEN as u64 + self.compressed_size
    }
}

impl FileMetadata {
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    pub fn num_row_groups(&self) -> usize {
        self.row_groups.len()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_group(&self, idx: usize) -> Option<&RowGroupMetadata> {
        self.row_groups.get(idx)
    }

    /// Top-level column metadata by name
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.schema.column(name).map(|(_, c)| c)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.column(name).map(|(idx, _)| idx)
    }

    /// Resolve column names to indices; `Schema` error on an unknown name
    pub fn resolve_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.column_index(name)
                    .ok_or_else(|| ColfileError::schema(format!("Column '{}' not found", name)))
            })
            .collect()
    }

    /// Estimated decoded size of the given columns of one row group
    pub fn decoded_size(&self, row_group: usize, columns: &[usize]) -> u64 {
        self.row_groups
            .get(row_group)
            .map(|rg| columns.iter().map(|&c| rg.columns[c].decoded_size).sum())
            .unwrap_or(0)
    }

    /// Statistics of every leaf of a top-level column, merged across row groups
    pub fn column_statistics(&self, name: &str) -> Option<Vec<ColumnStatistics>> {
        let idx = self.column_index(name)?;
        let mut merged: Option<Vec<ColumnStatistics>> = None;
        for rg in &self.row_groups {
            let stats = &rg.columns[idx].statistics;
            match merged.as_mut() {
                None => merged = Some(stats.clone()),
                Some(acc) => {
                    for (acc_stat, stat) in acc.iter_mut().zip(stats) {
                        acc_stat.merge(stat);
                    }
                }
            }
        }
        merged
    }

    /// Check the internal consistency of a parsed footer against a source of
    /// `file_len` bytes whose footer starts at `footer_start`
    fn validate(&self, footer_start: u64) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(ColfileError::corrupt(format!(
                "Unsupported format version {}",
                self.version
            )));
        }
        self.schema
            .validate()
            .map_err(|e| ColfileError::corrupt(format!("Footer schema is invalid: {}", e)))?;

        let mut total_rows = 0u64;
        for (rg_idx, rg) in self.row_groups.iter().enumerate() {
            if rg.columns.len() != self.schema.num_columns() {
                return Err(ColfileError::corrupt(format!(
                    "Row group {} has {} chunks for {} columns",
                    rg_idx,
                    rg.columns.len(),
                    self.schema.num_columns()
                )));
            }
            for (col_idx, chunk) in rg.columns.iter().enumerate() {
                let end = chunk.offset.checked_add(chunk.frame_len());
                if chunk.offset < MAGIC.len() as u64 || end.map_or(true, |end| end > footer_start)
                {
                    return Err(ColfileError::corrupt(format!(
                        "Chunk {} of row group {} lies outside the data region",
                        col_idx, rg_idx
                    )));
                }
                if chunk.num_rows != rg.num_rows {
                    return Err(ColfileError::corrupt(format!(
                        "Chunk {} of row group {} has {} rows, row group has {}",
                        col_idx, rg_idx, chunk.num_rows, rg.num_rows
                    )));
                }
            }
            total_rows += rg.num_rows;
        }
        if total_rows != self.num_rows {
            return Err(ColfileError::corrupt(format!(
                "Row groups hold {} rows but footer records {}",
                total_rows, self.num_rows
            )));
        }
        Ok(())
    }
}

/// Serialize the footer followed by the trailer
pub(crate) fn encode_footer(metadata: &FileMetadata) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec(metadata)
        .map_err(|e| ColfileError::encoding(format!("Failed to serialize footer: {}", e)))?;
    let footer_len = u32::try_from(out.len())
        .map_err(|_| ColfileError::encoding("Footer exceeds 4 GiB"))?;
    out.extend_from_slice(&footer_len.to_le_bytes());
    out.extend_from_slice(MAGIC);
    Ok(out)
}

/// Read the footer of a file, touching only the trailer and footer bytes
pub fn read_metadata<R: ChunkReader + ?Sized>(source: &R) -> Result<FileMetadata> {
    let file_len = source.len();
    let min_len = (MAGIC.len() + TRAILER_LEN) as u64;
    if file_len < min_len {
        return Err(ColfileError::corrupt(format!(
            "File is {} bytes, smaller than the minimum of {}",
            file_len, min_len
        )));
    }

    let trailer = source.get_bytes(file_len - TRAILER_LEN as u64, TRAILER_LEN)?;
    if &trailer[4..] != MAGIC {
        return Err(ColfileError::corrupt("Trailing magic bytes not found"));
    }
    let footer_len = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as u64;
    let footer_end = file_len - TRAILER_LEN as u64;
    if footer_len > footer_end - MAGIC.len() as u64 {
        return Err(ColfileError::corrupt(format!(
            "Footer length {} exceeds the file",
            footer_len
        )));
    }
    let footer_start = footer_end - footer_len;

    let footer = source.get_bytes(footer_start, footer_len as usize)?;
    let metadata: FileMetadata = serde_json::from_slice(&footer)
        .map_err(|e| ColfileError::corrupt(format!("Failed to parse footer: {}", e)))?;
    metadata.validate(footer_start)?;

    debug!(
        footer_len,
        row_groups = metadata.row_groups.len(),
        num_rows = metadata.num_rows,
        "parsed footer"
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogicalType;
    use bytes::Bytes;

    fn file_with_footer(metadata: &FileMetadata, data_len: usize) -> Bytes {
        let mut out = MAGIC.to_vec();
        out.extend(std::iter::repeat(0u8).take(data_len));
        out.extend(encode_footer(metadata).unwrap());
        Bytes::from(out)
    }

    fn empty_metadata() -> FileMetadata {
        FileMetadata {
            version: FORMAT_VERSION,
            schema: Schema {
                columns: vec![ColumnMetadata::new("x", LogicalType::Int32, true)],
            },
            row_groups: vec![],
            num_rows: 0,
            created_by: Some("test".into()),
        }
    }

    #[test]
    fn test_footer_roundtrip() {
        let metadata = empty_metadata();
        let file = file_with_footer(&metadata, 0);
        assert_eq!(read_metadata(&file).unwrap(), metadata);
    }

    #[test]
    fn test_short_file() {
        let file = Bytes::from_static(b"CLF1CLF1");
        assert!(matches!(read_metadata(&file), Err(ColfileError::CorruptFile(_))));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = file_with_footer(&empty_metadata(), 0).to_vec();
        let len = bytes.len();
        bytes[len - 1] = b'X';
        assert!(matches!(
            read_metadata(&Bytes::from(bytes)),
            Err(ColfileError::CorruptFile(_))
        ));
    }

    #[test]
    fn test_footer_length_out_of_range() {
        let mut bytes = file_with_footer(&empty_metadata(), 0).to_vec();
        let len = bytes.len();
        bytes[len - 8..len - 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            read_metadata(&Bytes::from(bytes)),
            Err(ColfileError::CorruptFile(_))
        ));
    }

    #[test]
    fn test_unparseable_footer() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(b"{not json");
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(MAGIC);
        assert!(matches!(
            read_metadata(&Bytes::from(bytes)),
            Err(ColfileError::CorruptFile(_))
        ));
    }

    #[test]
    fn test_chunk_outside_data_region() {
        let mut metadata = empty_metadata();
        metadata.row_groups.push(RowGroupMetadata {
            num_rows: 1,
            offset: 4,
            total_byte_size: 100,
            columns: vec![ColumnChunkMetadata {
                offset: 4,
                compressed_size: 91,
                uncompressed_size: 91,
                codec: CompressionCodec::Uncompressed,
                num_rows: 1,
                decoded_size: 4,
                statistics: vec![],
            }],
        });
        metadata.num_rows = 1;
        let file = file_with_footer(&metadata, 10);
        assert!(matches!(read_metadata(&file), Err(ColfileError::CorruptFile(_))));

        // the same footer is fine once the data region is large enough
        let file = file_with_footer(&metadata, 100);
        assert!(read_metadata(&file).is_ok());
    }

    #[test]
    fn test_row_count_disagreement() {
        let mut metadata = empty_metadata();
        metadata.num_rows = 3;
        let file = file_with_footer(&metadata, 0);
        assert!(matches!(read_metadata(&file), Err(ColfileError::CorruptFile(_))));
    }
}
