//! Bounded-memory reading: each pass decodes as many whole row groups as fit
//! in the caller's output budget.

use std::sync::Arc;
use tracing::debug;

use crate::io::ChunkReader;
use crate::metadata::{read_metadata, FileMetadata};
use crate::reader::{read_row_group, ReadPlan, ReaderOptions};
use crate::schema::Schema;
use crate::{ColfileError, Result, Table};

/// A reading session returning the file in budget-sized pieces.
///
/// The budget is compared against the decoded sizes recorded in the footer.
/// A pass always contains at least one row group, so a single row group
/// larger than the budget is still returned whole.
pub struct ChunkedReader<R> {
    source: R,
    metadata: Arc<FileMetadata>,
    options: ReaderOptions,
    plan: ReadPlan,
    pass_read_limit: u64,
    next: usize,
}

impl<R: ChunkReader> ChunkedReader<R> {
    /// Parse the footer and plan the read; `pass_read_limit` of 0 means no
    /// limit
    pub fn open(pass_read_limit: usize, options: ReaderOptions, source: R) -> Result<Self> {
        let metadata = Arc::new(read_metadata(&source)?);
        let plan = ReadPlan::new(&metadata, &options)?;
        debug!(
            pass_read_limit,
            row_groups = plan.row_groups.len(),
            columns = plan.columns.len(),
            "opened chunked reader"
        );
        Ok(Self {
            source,
            metadata,
            options,
            plan,
            pass_read_limit: pass_read_limit as u64,
            next: 0,
        })
    }

    /// Whether another call to [`read_chunk`](Self::read_chunk) will return
    /// data
    pub fn has_next(&self) -> bool {
        self.next < self.plan.row_groups.len()
    }

    /// Decode the next pass.
    ///
    /// On error the cursor does not move, so the same pass can be retried.
    pub fn read_chunk(&mut self) -> Result<Table> {
        if !self.has_next() {
            return Err(ColfileError::invalid_state(
                "No more chunks: the reader is exhausted",
            ));
        }

        let start = self.next;
        let mut end = start + 1;
        let mut estimated = self.plan.decoded_size(&self.metadata, &self.plan.row_groups[start]);
        while end < self.plan.row_groups.len() {
            let size = self.plan.decoded_size(&self.metadata, &self.plan.row_groups[end]);
            if self.pass_read_limit != 0 && estimated + size > self.pass_read_limit {
                break;
            }
            estimated += size;
            end += 1;
        }
        debug!(
            first = self.plan.row_groups[start].index,
            row_groups = end - start,
            estimated,
            limit = self.pass_read_limit,
            "planned read pass"
        );

        let tables = self.plan.row_groups[start..end]
            .iter()
            .map(|read| {
                read_row_group(
                    &self.source,
                    &self.metadata,
                    &self.plan.columns,
                    read,
                    self.options.codec().as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let table = Table::concat(&tables)?;

        self.next = end;
        Ok(table)
    }

    pub fn metadata(&self) -> &Arc<FileMetadata> {
        &self.metadata
    }

    pub fn schema(&self) -> &Schema {
        &self.metadata.schema
    }

    /// Number of passes left, assuming no further errors
    pub fn remaining_row_groups(&self) -> usize {
        self.plan.row_groups.len() - self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableInputMetadata;
    use crate::writer::{write_table, WriterOptions};
    use crate::{Column, ErrorKind};
    use bytes::Bytes;

    fn file(rows: i64, per_group: usize) -> (Table, Bytes) {
        let table = Table::try_new(vec![Column::int64((0..rows).collect())]).unwrap();
        let mut sink = Vec::new();
        write_table(
            &table,
            &TableInputMetadata::from_names(["x"]),
            WriterOptions::new().with_max_rows_per_row_group(per_group),
            &mut sink,
        )
        .unwrap();
        (table, Bytes::from(sink))
    }

    #[test]
    fn test_budget_groups_row_groups() {
        // 10 rows of i64 per group = 80 bytes each
        let (table, bytes) = file(50, 10);
        let mut reader = ChunkedReader::open(250, ReaderOptions::new(), bytes).unwrap();
        let mut sizes = Vec::new();
        let mut parts = Vec::new();
        while reader.has_next() {
            let chunk = reader.read_chunk().unwrap();
            sizes.push(chunk.num_rows());
            assert!(chunk.memory_size() <= 250);
            parts.push(chunk);
        }
        assert_eq!(sizes, vec![30, 20]);
        assert_eq!(Table::concat(&parts).unwrap(), table);
    }

    #[test]
    fn test_oversized_row_group_still_returned() {
        let (_, bytes) = file(30, 10);
        let mut reader = ChunkedReader::open(1, ReaderOptions::new(), bytes).unwrap();
        assert_eq!(reader.read_chunk().unwrap().num_rows(), 10);
        assert_eq!(reader.remaining_row_groups(), 2);
    }

    #[test]
    fn test_unlimited_and_exhaustion() {
        let (table, bytes) = file(30, 10);
        let mut reader = ChunkedReader::open(0, ReaderOptions::new(), bytes).unwrap();
        assert!(reader.has_next());
        assert!(reader.has_next());
        assert_eq!(reader.read_chunk().unwrap(), table);
        assert!(!reader.has_next());
        let err = reader.read_chunk().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
