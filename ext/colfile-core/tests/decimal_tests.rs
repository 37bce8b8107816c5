use colfile_core::*;

use test_helpers::*;

#[test]
fn test_decimal_precision_and_scale_preserved() {
    let cases: Vec<(u8, i8, Vec<i128>)> = vec![
        (1, 0, vec![0, 9, -9]),
        (9, 2, vec![12345, -99999, 0]),
        (18, 6, vec![123456789012345678, -1, 7]),
        (38, 10, vec![i128::MAX / 10_000, -(10i128.pow(37)), 1]),
        (5, -3, vec![12345, -1, 0]),
    ];

    for (precision, scale, values) in cases {
        let table = Table::try_new(vec![Column::decimal(precision, scale, values.clone()).unwrap()])
            .unwrap();
        let bytes = write_bytes(
            &table,
            &TableInputMetadata::from_names(["d"]),
            WriterOptions::default(),
        );
        let read = read_table(bytes, None).unwrap();
        let decimals = read.columns()[0].as_decimal().unwrap();
        assert_eq!(decimals.precision(), precision);
        assert_eq!(decimals.scale(), scale);
        assert_eq!(decimals.values(), values.as_slice());
    }
}

#[test]
fn test_decimal_values_and_display() {
    let table = Table::try_new(vec![Column::decimal(10, 2, vec![12345, -5]).unwrap()]).unwrap();
    let bytes = write_bytes(
        &table,
        &TableInputMetadata::from_names(["price"]),
        WriterOptions::default(),
    );
    let read = read_table(bytes, None).unwrap();

    assert_eq!(read.row(0), vec![Value::Decimal(Decimal::new(12345, 2))]);
    let decimals = read.columns()[0].as_decimal().unwrap();
    assert_eq!(decimals.value(0).to_string(), "123.45");
    assert_eq!(decimals.value(1).to_string(), "-0.05");
}

#[test]
fn test_decimal_negative_scale_display() {
    let value = Decimal::new(42, -3);
    assert_eq!(value.to_string(), "42000");
    assert_eq!(value, Decimal::new(42000, 0));
}

#[test]
fn test_decimal_with_nulls_and_statistics() {
    let table = Table::try_new(vec![
        Column::decimal(12, 4, vec![10_000, 0, -25_000, 5])
            .unwrap()
            .with_valid_rows([true, false, true, true]),
    ])
    .unwrap();
    let bytes = write_bytes(
        &table,
        &TableInputMetadata::from_names(["d"]),
        WriterOptions::default(),
    );

    assert_eq!(read_table(bytes.clone(), None).unwrap(), table);

    let stats = read_metadata(&bytes).unwrap().column_statistics("d").unwrap();
    assert_eq!(stats[0].null_count, 1);
    assert_eq!(stats[0].min, Some(StatValue::Decimal(Decimal::new(-25_000, 4))));
    assert_eq!(stats[0].max, Some(StatValue::Decimal(Decimal::new(10_000, 4))));
}

#[test]
fn test_decimal_exceeding_precision_rejected() {
    let table = Table::new(vec![Column::decimal(3, 0, vec![1000]).unwrap()]);
    let err = write_table(
        &table,
        &TableInputMetadata::from_names(["d"]),
        WriterOptions::default(),
        Vec::new(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
}

#[test]
fn test_decimal_invalid_precision() {
    assert_eq!(
        Column::decimal(0, 0, vec![]).unwrap_err().kind(),
        ErrorKind::Schema
    );
    assert_eq!(
        Column::decimal(39, 0, vec![]).unwrap_err().kind(),
        ErrorKind::Schema
    );
}

#[test]
fn test_decimal_in_list_and_struct() {
    let prices = Column::list(vec![0, 2, 3], Column::decimal(8, 2, vec![100, 250, -1]).unwrap())
        .unwrap();
    let order = Column::structure(vec![
        Column::decimal(4, 1, vec![15, 20]).unwrap(),
        Column::strings(["a", "b"]).unwrap(),
    ])
    .unwrap();
    let table = Table::try_new(vec![prices, order]).unwrap();
    test_roundtrip(
        table,
        TableInputMetadata::new(vec![
            ColumnInMetadata::new("prices"),
            ColumnInMetadata::new("order")
                .with_child(ColumnInMetadata::new("discount"))
                .with_child(ColumnInMetadata::new("code")),
        ]),
    )
    .unwrap();
}

#[test]
fn test_declared_decimal_type_must_match() {
    let table = Table::try_new(vec![Column::decimal(10, 2, vec![1]).unwrap()]).unwrap();
    let err = write_table(
        &table,
        &TableInputMetadata::new(vec![ColumnInMetadata::new("d")
            .with_type(LogicalType::decimal(10, 3).unwrap())]),
        WriterOptions::default(),
        Vec::new(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}
