use crate::{ColfileError, Column, LogicalType, Result, Value};

/// An ordered set of top-level columns sharing one row count.
///
/// `Table::new` does not check the row-count invariant so that callers can
/// hand any set of columns to the writer, which reports violations as
/// encoding errors. Use [`Table::try_new`] to check up front.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn try_new(columns: Vec<Column>) -> Result<Self> {
        let table = Self::new(columns);
        table.validate()?;
        Ok(table)
    }

    /// A table with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Logical types of the top-level columns
    pub fn logical_types(&self) -> Vec<LogicalType> {
        self.columns.iter().map(Column::logical_type).collect()
    }

    /// Check that every column has the same row count and is well formed
    pub fn validate(&self) -> Result<()> {
        let rows = self.num_rows();
        for (idx, column) in self.columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ColfileError::encoding(format!(
                    "Column {} has {} rows but column 0 has {}",
                    idx,
                    column.len(),
                    rows
                )));
            }
            column.validate()?;
        }
        Ok(())
    }

    /// Values of row `idx`, one per column
    pub fn row(&self, idx: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(idx)).collect()
    }

    /// Deep copy of rows `[offset, offset + len)`
    pub fn slice(&self, offset: usize, len: usize) -> Table {
        Table::new(self.columns.iter().map(|c| c.slice(offset, len)).collect())
    }

    /// Approximate in-memory footprint in bytes
    pub fn memory_size(&self) -> usize {
        self.columns.iter().map(Column::memory_size).sum()
    }

    /// Estimated bytes of every row across all columns
    pub fn row_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_rows()];
        for column in &self.columns {
            for (total, size) in sizes.iter_mut().zip(column.row_sizes()) {
                *total += size;
            }
        }
        sizes
    }

    /// Concatenate tables with identical column shapes, preserving order
    pub fn concat(tables: &[Table]) -> Result<Table> {
        let Some(first) = tables.first() else {
            return Ok(Table::empty());
        };
        if tables.len() == 1 {
            return Ok(first.clone());
        }
        if let Some(other) = tables.iter().find(|t| t.num_columns() != first.num_columns()) {
            return Err(ColfileError::schema(format!(
                "Cannot concatenate tables with {} and {} columns",
                first.num_columns(),
                other.num_columns()
            )));
        }
        let columns = (0..first.num_columns())
            .map(|idx| {
                let parts: Vec<&Column> = tables.iter().map(|t| &t.columns[idx]).collect();
                Column::concat(&parts)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Table::new(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_validation() {
        let result = Table::try_new(vec![Column::int32(vec![1, 2]), Column::int32(vec![1])]);
        assert!(matches!(result, Err(ColfileError::Encoding(_))));

        let table = Table::new(vec![Column::int32(vec![1, 2]), Column::int32(vec![1])]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_slice_and_concat() {
        let table = Table::try_new(vec![
            Column::int32((0..10).collect()),
            Column::strings((0..10).map(|i| format!("s{}", i))).unwrap(),
        ])
        .unwrap();
        let parts = vec![table.slice(0, 3), table.slice(3, 0), table.slice(3, 7)];
        let joined = Table::concat(&parts).unwrap();
        assert_eq!(joined, table);
        assert_eq!(joined.row(4), vec![Value::Int32(4), Value::from("s4")]);
    }

    #[test]
    fn test_concat_mismatched_column_counts() {
        let a = Table::new(vec![Column::int32(vec![1])]);
        let b = Table::new(vec![Column::int32(vec![1]), Column::int32(vec![2])]);
        assert!(Table::concat(&[a, b]).is_err());
    }
}
