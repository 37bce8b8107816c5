//! Bidirectional conversion between Arrow record batches and tables
//!
//! Conversion works column by column on whole buffers. Names and nullability
//! travel through [`ColumnMetadata`] on the way out and are recovered from
//! the Arrow fields on the way back.

use crate::bitmap::Bitmap;
use crate::schema::{ColumnMetadata, Schema};
use crate::{ColfileError, Column, ColumnData, LogicalType, Result, StructField, Table};
use arrow_array::types::{
    ArrowPrimitiveType, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type,
};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Decimal128Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, ListArray, PrimitiveArray, RecordBatch, RecordBatchOptions,
    StringArray, StructArray,
};
use arrow_buffer::{BooleanBuffer, Buffer, NullBuffer, OffsetBuffer, ScalarBuffer};
use arrow_schema::{DataType, Field, Fields};
use std::sync::Arc;

/// Arrow data type for a logical type; nested members are nullable
pub fn logical_type_to_arrow(logical_type: &LogicalType) -> DataType {
    match logical_type {
        LogicalType::Boolean => DataType::Boolean,
        LogicalType::Int8 => DataType::Int8,
        LogicalType::Int16 => DataType::Int16,
        LogicalType::Int32 => DataType::Int32,
        LogicalType::Int64 => DataType::Int64,
        LogicalType::Float32 => DataType::Float32,
        LogicalType::Float64 => DataType::Float64,
        LogicalType::Decimal { precision, scale } => DataType::Decimal128(*precision, *scale),
        LogicalType::String => DataType::Utf8,
        LogicalType::List(element) => DataType::List(Arc::new(Field::new(
            "element",
            logical_type_to_arrow(element),
            true,
        ))),
        LogicalType::Struct(fields) => DataType::Struct(Fields::from(
            fields
                .iter()
                .map(|f| Field::new(f.name.clone(), logical_type_to_arrow(&f.data_type), true))
                .collect::<Vec<_>>(),
        )),
    }
}

/// Logical type for an Arrow data type
pub fn arrow_to_logical_type(data_type: &DataType) -> Result<LogicalType> {
    Ok(match data_type {
        DataType::Boolean => LogicalType::Boolean,
        DataType::Int8 => LogicalType::Int8,
        DataType::Int16 => LogicalType::Int16,
        DataType::Int32 => LogicalType::Int32,
        DataType::Int64 => LogicalType::Int64,
        DataType::Float32 => LogicalType::Float32,
        DataType::Float64 => LogicalType::Float64,
        DataType::Decimal128(precision, scale) => LogicalType::decimal(*precision, *scale)?,
        DataType::Utf8 => LogicalType::String,
        DataType::List(element) => {
            LogicalType::List(Box::new(arrow_to_logical_type(element.data_type())?))
        }
        DataType::Struct(fields) => LogicalType::Struct(
            fields
                .iter()
                .map(|f| Ok(StructField::new(f.name().clone(), arrow_to_logical_type(f.data_type())?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(ColfileError::schema(format!(
                "Arrow type {} has no columnar equivalent",
                other
            )))
        }
    })
}

/// Arrow field carrying the name, type and nullability of a schema node
pub fn column_metadata_to_field(meta: &ColumnMetadata) -> Field {
    let data_type = match &meta.logical_type {
        LogicalType::List(_) => match meta.children.first() {
            Some(child) => DataType::List(Arc::new(column_metadata_to_field(child))),
            None => logical_type_to_arrow(&meta.logical_type),
        },
        LogicalType::Struct(_) => DataType::Struct(Fields::from(
            meta.children
                .iter()
                .map(column_metadata_to_field)
                .collect::<Vec<_>>(),
        )),
        other => logical_type_to_arrow(other),
    };
    Field::new(meta.name.clone(), data_type, meta.nullable)
}

/// Schema node for an Arrow field
pub fn field_to_column_metadata(field: &Field) -> Result<ColumnMetadata> {
    let children = match field.data_type() {
        DataType::List(element) => vec![field_to_column_metadata(element)?],
        DataType::Struct(fields) => fields
            .iter()
            .map(|f| field_to_column_metadata(f))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    let logical_type = match field.data_type() {
        DataType::List(_) => LogicalType::List(Box::new(children[0].logical_type.clone())),
        DataType::Struct(_) => LogicalType::Struct(
            children
                .iter()
                .map(|c| StructField::new(c.name.clone(), c.logical_type.clone()))
                .collect(),
        ),
        other => arrow_to_logical_type(other)?,
    };
    Ok(ColumnMetadata {
        name: field.name().clone(),
        logical_type,
        nullable: field.is_nullable(),
        children,
    })
}

pub fn schema_to_arrow(schema: &Schema) -> arrow_schema::Schema {
    arrow_schema::Schema::new(
        schema
            .columns
            .iter()
            .map(column_metadata_to_field)
            .collect::<Vec<_>>(),
    )
}

fn null_buffer(column: &Column) -> Option<NullBuffer> {
    column
        .validity()
        .map(|v| NullBuffer::from(v.iter().collect::<Vec<bool>>()))
}

fn primitive<T: ArrowPrimitiveType>(
    values: &[T::Native],
    nulls: Option<NullBuffer>,
) -> Result<PrimitiveArray<T>> {
    Ok(PrimitiveArray::<T>::try_new(
        ScalarBuffer::from(values.to_vec()),
        nulls,
    )?)
}

/// Convert one column to an Arrow array shaped by `meta`
pub fn column_to_arrow_array(column: &Column, meta: &ColumnMetadata) -> Result<ArrayRef> {
    let nulls = null_buffer(column);
    let array: ArrayRef = match column.data() {
        ColumnData::Boolean(values) => Arc::new(BooleanArray::new(
            BooleanBuffer::from_iter(values.iter().copied()),
            nulls,
        )),
        ColumnData::Int8(values) => Arc::new(primitive::<Int8Type>(values, nulls)?),
        ColumnData::Int16(values) => Arc::new(primitive::<Int16Type>(values, nulls)?),
        ColumnData::Int32(values) => Arc::new(primitive::<Int32Type>(values, nulls)?),
        ColumnData::Int64(values) => Arc::new(primitive::<Int64Type>(values, nulls)?),
        ColumnData::Float32(values) => Arc::new(primitive::<Float32Type>(values, nulls)?),
        ColumnData::Float64(values) => Arc::new(primitive::<Float64Type>(values, nulls)?),
        ColumnData::Decimal(d) => Arc::new(
            primitive::<Decimal128Type>(d.values(), nulls)?
                .with_precision_and_scale(d.precision(), d.scale())?,
        ),
        ColumnData::String(s) => Arc::new(StringArray::try_new(
            OffsetBuffer::new(ScalarBuffer::from(s.offsets().to_vec())),
            Buffer::from_vec(s.data().as_bytes().to_vec()),
            nulls,
        )?),
        ColumnData::List(l) => {
            let child_meta = meta
                .children
                .first()
                .ok_or_else(|| ColfileError::schema(format!("List '{}' has no child", meta.name)))?;
            let values = column_to_arrow_array(l.child(), child_meta)?;
            Arc::new(ListArray::try_new(
                Arc::new(column_metadata_to_field(child_meta)),
                OffsetBuffer::new(ScalarBuffer::from(l.offsets().to_vec())),
                values,
                nulls,
            )?)
        }
        ColumnData::Struct(s) => {
            if s.children().len() != meta.children.len() {
                return Err(ColfileError::schema(format!(
                    "Struct '{}' has {} children but metadata describes {}",
                    meta.name,
                    s.children().len(),
                    meta.children.len()
                )));
            }
            let arrays = s
                .children()
                .iter()
                .zip(&meta.children)
                .map(|(child, child_meta)| column_to_arrow_array(child, child_meta))
                .collect::<Result<Vec<_>>>()?;
            let fields = Fields::from(
                meta.children
                    .iter()
                    .map(column_metadata_to_field)
                    .collect::<Vec<_>>(),
            );
            Arc::new(StructArray::try_new(fields, arrays, nulls)?)
        }
    };
    Ok(array)
}

/// Convert an Arrow array to a column, copying its buffers
pub fn arrow_array_to_column(array: &dyn Array) -> Result<Column> {
    let column = match array.data_type() {
        DataType::Boolean => {
            let array = downcast_array::<BooleanArray>(array)?;
            Column::boolean(array.values().iter().collect())
        }
        DataType::Int8 => Column::int8(downcast_array::<Int8Array>(array)?.values().to_vec()),
        DataType::Int16 => Column::int16(downcast_array::<Int16Array>(array)?.values().to_vec()),
        DataType::Int32 => Column::int32(downcast_array::<Int32Array>(array)?.values().to_vec()),
        DataType::Int64 => Column::int64(downcast_array::<Int64Array>(array)?.values().to_vec()),
        DataType::Float32 => {
            Column::float32(downcast_array::<Float32Array>(array)?.values().to_vec())
        }
        DataType::Float64 => {
            Column::float64(downcast_array::<Float64Array>(array)?.values().to_vec())
        }
        DataType::Decimal128(precision, scale) => {
            let array = downcast_array::<Decimal128Array>(array)?;
            Column::decimal(*precision, *scale, array.values().to_vec())?
        }
        DataType::Utf8 => {
            let array = downcast_array::<StringArray>(array)?;
            let offsets = array.value_offsets();
            let first = offsets[0];
            let last = offsets[offsets.len() - 1];
            let data = std::str::from_utf8(&array.value_data()[first as usize..last as usize])
                .map_err(|e| ColfileError::encoding(format!("Invalid UTF-8 in Arrow array: {}", e)))?;
            Column::strings_from_parts(
                offsets.iter().map(|o| o - first).collect(),
                data.to_string(),
            )?
        }
        DataType::List(_) => {
            let array = downcast_array::<ListArray>(array)?;
            let offsets = array.value_offsets();
            let first = offsets[0];
            let last = offsets[offsets.len() - 1];
            let child = array.values().slice(first as usize, (last - first) as usize);
            Column::list(
                offsets.iter().map(|o| o - first).collect(),
                arrow_array_to_column(child.as_ref())?,
            )?
        }
        DataType::Struct(_) => {
            let array = downcast_array::<StructArray>(array)?;
            let children = array
                .columns()
                .iter()
                .map(|c| arrow_array_to_column(c.as_ref()))
                .collect::<Result<Vec<_>>>()?;
            Column::structure_with_len(array.len(), children)?
        }
        other => {
            return Err(ColfileError::schema(format!(
                "Arrow type {} has no columnar equivalent",
                other
            )))
        }
    };

    Ok(match array.nulls() {
        Some(nulls) => column.with_validity(nulls.iter().collect::<Bitmap>()),
        None => column,
    })
}

/// Convert a table and its schema to a record batch
pub fn table_to_record_batch(table: &Table, schema: &Schema) -> Result<RecordBatch> {
    schema.check_table(table)?;
    let arrays = table
        .columns()
        .iter()
        .zip(&schema.columns)
        .map(|(column, meta)| column_to_arrow_array(column, meta))
        .collect::<Result<Vec<_>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(schema_to_arrow(schema)),
        arrays,
        &options,
    )?)
}

/// Convert a record batch to a table plus the schema described by its fields
pub fn record_batch_to_table(batch: &RecordBatch) -> Result<(Table, Schema)> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| arrow_array_to_column(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let schema = Schema {
        columns: batch
            .schema()
            .fields()
            .iter()
            .map(|f| field_to_column_metadata(f))
            .collect::<Result<Vec<_>>>()?,
    };
    schema.validate()?;
    Ok((Table::new(columns), schema))
}

/// Helper function to downcast an array with better error messages
fn downcast_array<T: 'static>(array: &dyn Array) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        ColfileError::type_mismatch(format!(
            "Failed to downcast array of type {}",
            array.data_type()
        ))
    })
}
