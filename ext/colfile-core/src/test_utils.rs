//! Test utilities for colfile-core

#[cfg(test)]
pub mod test {
    use bytes::Bytes;

    use crate::schema::{ColumnInMetadata, TableInputMetadata};
    use crate::writer::{write_table, WriterOptions};
    use crate::{Column, LogicalType, Table, Value};

    /// A flat table: id, name, age, salary with a null name and salary
    pub fn sample_table() -> Table {
        Table::try_new(vec![
            Column::int64(vec![1, 2, 3, 4]),
            Column::strings(["Alice", "", "Carol", "Dave"])
                .unwrap()
                .with_valid_rows([true, false, true, true]),
            Column::int32(vec![30, 25, 41, 19]),
            Column::float64(vec![75000.0, 0.0, 91000.5, 42000.0])
                .with_valid_rows([true, false, true, true]),
        ])
        .unwrap()
    }

    pub fn sample_metadata() -> TableInputMetadata {
        TableInputMetadata::from_names(["id", "name", "age", "salary"])
    }

    /// A nested table: id plus person{name, scores: list<float32>}
    pub fn nested_table() -> Table {
        let scores = Column::list(
            vec![0, 3, 3, 5],
            Column::float32(vec![90.5, 87.25, 92.0, 70.0, 71.5]),
        )
        .unwrap()
        .with_valid_rows([true, false, true]);
        let names = Column::strings(["Bob", "Eve", "Max"]).unwrap();
        let person = Column::structure(vec![names, scores]).unwrap();
        Table::try_new(vec![Column::int64(vec![1, 2, 3]), person]).unwrap()
    }

    pub fn nested_metadata() -> TableInputMetadata {
        TableInputMetadata::new(vec![
            ColumnInMetadata::new("id").with_nullable(false),
            ColumnInMetadata::new("person")
                .with_child(ColumnInMetadata::new("name"))
                .with_child(ColumnInMetadata::new("scores")),
        ])
    }

    /// Multiple sample rows of the flat layout
    pub fn sample_rows(count: usize) -> Table {
        Table::try_new(vec![
            Column::int64((0..count as i64).collect()),
            Column::strings((0..count).map(|i| format!("Person{}", i))).unwrap(),
            Column::int32((0..count).map(|i| (20 + i % 50) as i32).collect()),
            Column::float64((0..count).map(|i| 50000.0 + i as f64 * 1000.0).collect()),
        ])
        .unwrap()
    }

    /// One column per logical type, all with the same three rows
    pub fn all_type_columns() -> Vec<(LogicalType, Column)> {
        vec![
            (LogicalType::Boolean, Column::boolean(vec![true, false, true])),
            (LogicalType::Int8, Column::int8(vec![42, -1, 0])),
            (LogicalType::Int16, Column::int16(vec![1000, -1000, 7])),
            (LogicalType::Int32, Column::int32(vec![100000, 0, -5])),
            (LogicalType::Int64, Column::int64(vec![1000000000, 1, -1])),
            (LogicalType::Float32, Column::float32(vec![3.75, -0.5, 0.0])),
            (LogicalType::Float64, Column::float64(vec![2.625, 1e300, -1e-300])),
            (
                LogicalType::Decimal {
                    precision: 10,
                    scale: 2,
                },
                Column::decimal(10, 2, vec![12345, -1, 0]).unwrap(),
            ),
            (LogicalType::String, Column::strings(["test string", "", "ü"]).unwrap()),
        ]
    }

    /// Encode a table into an in-memory file
    pub fn write_to_bytes(
        table: &Table,
        metadata: &TableInputMetadata,
        options: WriterOptions,
    ) -> Bytes {
        let mut sink = Vec::new();
        write_table(table, metadata, options, &mut sink).unwrap();
        Bytes::from(sink)
    }

    /// Compare values, treating floats within epsilon as equal
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Float32(a), Value::Float32(b)) => (a.0 - b.0).abs() < f32::EPSILON,
            (Value::Float64(a), Value::Float64(b)) => (a.0 - b.0).abs() < f64::EPSILON,
            (Value::List(a), Value::List(b)) | (Value::Struct(a), Value::Struct(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| values_equal(a, b))
            }
            _ => a == b,
        }
    }

    /// Assert that two rows of values are equal
    pub fn assert_values_equal(expected: &[Value], actual: &[Value]) {
        assert_eq!(
            expected.len(),
            actual.len(),
            "Value vectors have different lengths: expected {}, got {}",
            expected.len(),
            actual.len()
        );

        for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
            assert!(
                values_equal(e, a),
                "Values at index {} are not equal:\nExpected: {:?}\nActual: {:?}",
                i,
                e,
                a
            );
        }
    }
}

#[cfg(test)]
mod test_utils_tests {
    use super::test::*;
    use crate::reader::{read_table, Reader};
    use crate::schema::{Schema, TableInputMetadata};
    use crate::writer::WriterOptions;
    use crate::{Table, Value};

    #[test]
    fn test_sample_schema() {
        let schema = Schema::from_table(&sample_table(), &sample_metadata()).unwrap();
        assert_eq!(schema.names(), vec!["id", "name", "age", "salary"]);
        assert!(schema.columns.iter().all(|c| c.nullable));
    }

    #[test]
    fn test_nested_table_roundtrip() {
        let table = nested_table();
        let bytes = write_to_bytes(&table, &nested_metadata(), WriterOptions::default());
        let read = read_table(bytes, None).unwrap();
        assert_eq!(read, table);
        assert_eq!(read.row(1)[1], Value::Struct(vec![Value::from("Eve"), Value::Null]));
    }

    #[test]
    fn test_every_type_roundtrips() {
        for (logical_type, column) in all_type_columns() {
            let table = Table::try_new(vec![column]).unwrap();
            let bytes = write_to_bytes(
                &table,
                &TableInputMetadata::from_names(["v"]),
                WriterOptions::default(),
            );
            let read = read_table(bytes, None).unwrap();
            assert_eq!(read.logical_types(), vec![logical_type.clone()]);
            for i in 0..3 {
                assert_values_equal(&table.row(i), &read.row(i));
            }
        }
    }

    #[test]
    fn test_sample_rows_across_row_groups() {
        let table = sample_rows(250);
        let bytes = write_to_bytes(
            &table,
            &sample_metadata(),
            WriterOptions::new().with_max_rows_per_row_group(100),
        );
        let reader = Reader::new(bytes).unwrap();
        assert_eq!(reader.metadata().num_row_groups(), 3);
        assert_eq!(reader.read().unwrap(), table);
    }

    #[test]
    fn test_values_equal() {
        use ordered_float::OrderedFloat;

        assert!(values_equal(&Value::Int32(42), &Value::Int32(42)));
        assert!(values_equal(
            &Value::Float32(OrderedFloat(1.0)),
            &Value::Float32(OrderedFloat(1.0 + f32::EPSILON / 2.0))
        ));
        assert!(values_equal(
            &Value::List(vec![Value::Int32(1), Value::Int32(2)]),
            &Value::List(vec![Value::Int32(1), Value::Int32(2)])
        ));
        assert!(!values_equal(&Value::Int32(42), &Value::Int32(43)));
    }
}
