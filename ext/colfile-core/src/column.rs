//! In-memory columns: a validity mask plus physical values, with list and
//! struct columns owning their children.

use ordered_float::OrderedFloat;
use std::sync::Arc;

use crate::bitmap::Bitmap;
use crate::types::{Decimal, LogicalType, StructField, MAX_DECIMAL_PRECISION};
use crate::{ColfileError, Result, Value};

/// Name given to struct members when the caller does not supply one
pub fn default_field_name(idx: usize) -> String {
    format!("field_{}", idx)
}

/// A typed column of values with an optional validity mask.
///
/// An absent mask means every row is valid.
#[derive(Debug, Clone)]
pub struct Column {
    data: ColumnData,
    validity: Option<Bitmap>,
}

/// Physical storage of a column
#[derive(Debug, Clone)]
pub enum ColumnData {
    Boolean(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Decimal(DecimalData),
    String(StringData),
    List(ListData),
    Struct(StructData),
}

#[derive(Debug, Clone)]
pub struct DecimalData {
    precision: u8,
    scale: i8,
    values: Vec<i128>,
}

impl DecimalData {
    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn scale(&self) -> i8 {
        self.scale
    }

    pub fn values(&self) -> &[i128] {
        &self.values
    }

    pub fn value(&self, idx: usize) -> Decimal {
        Decimal::new(self.values[idx], self.scale)
    }
}

/// Variable-length UTF-8 strings: `offsets` has `len + 1` entries into `data`
#[derive(Debug, Clone)]
pub struct StringData {
    offsets: Vec<i32>,
    data: String,
}

impl StringData {
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn value(&self, idx: usize) -> &str {
        &self.data[self.offsets[idx] as usize..self.offsets[idx + 1] as usize]
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// List rows: row `i` spans child rows `offsets[i]..offsets[i + 1]`
#[derive(Debug, Clone)]
pub struct ListData {
    offsets: Vec<i32>,
    child: Box<Column>,
}

impl ListData {
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn child(&self) -> &Column {
        &self.child
    }

    pub fn value_range(&self, idx: usize) -> std::ops::Range<usize> {
        self.offsets[idx] as usize..self.offsets[idx + 1] as usize
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Struct rows: every child has exactly `len` rows
#[derive(Debug, Clone)]
pub struct StructData {
    len: usize,
    children: Vec<Column>,
}

impl StructData {
    pub fn children(&self) -> &[Column] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

mod private {
    pub trait Sealed {}
}

/// Fixed-width values stored directly in a `Vec`
pub trait NativeType: Copy + private::Sealed {
    fn slice_of(data: &ColumnData) -> Option<&[Self]>;
}

macro_rules! native_type {
    ($t:ty, $variant:ident) => {
        impl private::Sealed for $t {}

        impl NativeType for $t {
            fn slice_of(data: &ColumnData) -> Option<&[Self]> {
                match data {
                    ColumnData::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

native_type!(bool, Boolean);
native_type!(i8, Int8);
native_type!(i16, Int16);
native_type!(i32, Int32);
native_type!(i64, Int64);
native_type!(f32, Float32);
native_type!(f64, Float64);

/// Dispatch `$body` over every fixed-width variant, binding the vector to `$v`
macro_rules! with_native {
    ($data:expr, $v:ident => $body:expr, $other:pat => $fallback:expr) => {
        match $data {
            ColumnData::Boolean($v) => $body,
            ColumnData::Int8($v) => $body,
            ColumnData::Int16($v) => $body,
            ColumnData::Int32($v) => $body,
            ColumnData::Int64($v) => $body,
            ColumnData::Float32($v) => $body,
            ColumnData::Float64($v) => $body,
            $other => $fallback,
        }
    };
}

impl Column {
    pub fn new(data: ColumnData, validity: Option<Bitmap>) -> Self {
        Self { data, validity }
    }

    pub fn boolean(values: Vec<bool>) -> Self {
        Self::new(ColumnData::Boolean(values), None)
    }

    pub fn int8(values: Vec<i8>) -> Self {
        Self::new(ColumnData::Int8(values), None)
    }

    pub fn int16(values: Vec<i16>) -> Self {
        Self::new(ColumnData::Int16(values), None)
    }

    pub fn int32(values: Vec<i32>) -> Self {
        Self::new(ColumnData::Int32(values), None)
    }

    pub fn int64(values: Vec<i64>) -> Self {
        Self::new(ColumnData::Int64(values), None)
    }

    pub fn float32(values: Vec<f32>) -> Self {
        Self::new(ColumnData::Float32(values), None)
    }

    pub fn float64(values: Vec<f64>) -> Self {
        Self::new(ColumnData::Float64(values), None)
    }

    /// Decimal column with the maximum 128-bit precision
    pub fn decimal128(values: Vec<i128>, scale: i8) -> Self {
        Self::new(
            ColumnData::Decimal(DecimalData {
                precision: MAX_DECIMAL_PRECISION,
                scale,
                values,
            }),
            None,
        )
    }

    pub fn decimal(precision: u8, scale: i8, values: Vec<i128>) -> Result<Self> {
        LogicalType::decimal(precision, scale)?;
        Ok(Self::new(
            ColumnData::Decimal(DecimalData {
                precision,
                scale,
                values,
            }),
            None,
        ))
    }

    /// String column; fails once the concatenated bytes outgrow `i32` offsets
    pub fn strings<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut offsets = vec![0i32];
        let mut data = String::new();
        for value in values {
            data.push_str(value.as_ref());
            offsets.push(offset_from(data.len(), "string")?);
        }
        Ok(Self::new(ColumnData::String(StringData { offsets, data }), None))
    }

    /// String column from raw offsets into `data`
    pub fn strings_from_parts(offsets: Vec<i32>, data: String) -> Result<Self> {
        let column = Self::new(ColumnData::String(StringData { offsets, data }), None);
        column.validate()?;
        Ok(column)
    }

    /// List column from raw offsets; fails if the offsets are malformed
    pub fn list(offsets: Vec<i32>, child: Column) -> Result<Self> {
        check_offsets(&offsets, child.len(), "list")?;
        Ok(Self::new(
            ColumnData::List(ListData {
                offsets,
                child: Box::new(child),
            }),
            None,
        ))
    }

    /// Struct column; all children must share one row count
    pub fn structure(children: Vec<Column>) -> Result<Self> {
        let len = children.first().map(Column::len).unwrap_or(0);
        Self::structure_with_len(len, children)
    }

    pub fn structure_with_len(len: usize, children: Vec<Column>) -> Result<Self> {
        if let Some((idx, child)) = children.iter().enumerate().find(|(_, c)| c.len() != len) {
            return Err(ColfileError::encoding(format!(
                "Struct child {} has {} rows, expected {}",
                idx,
                child.len(),
                len
            )));
        }
        Ok(Self::new(
            ColumnData::Struct(StructData { len, children }),
            None,
        ))
    }

    /// Attach a validity mask, replacing any existing one
    pub fn with_validity(mut self, validity: Bitmap) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Attach a validity mask from per-row flags (`true` = valid)
    pub fn with_valid_rows<I: IntoIterator<Item = bool>>(self, valid: I) -> Self {
        self.with_validity(valid.into_iter().collect())
    }

    /// Build a column of `data_type` from row values.
    ///
    /// Fails with `TypeMismatch` when a value's variant does not fit the type,
    /// including a decimal whose scale differs from the declared one.
    pub fn from_values(data_type: &LogicalType, values: &[Value]) -> Result<Self> {
        let validity: Bitmap = values.iter().map(|v| !v.is_null()).collect();
        let has_nulls = validity.count_unset() > 0;

        macro_rules! collect_native {
            ($variant:ident, $ctor:ident, $default:expr) => {{
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::$variant(v) => out.push(*v),
                        Value::Null => out.push($default),
                        other => return Err(mismatch(data_type, other)),
                    }
                }
                Column::$ctor(out)
            }};
        }

        let column = match data_type {
            LogicalType::Boolean => collect_native!(Boolean, boolean, false),
            LogicalType::Int8 => collect_native!(Int8, int8, 0),
            LogicalType::Int16 => collect_native!(Int16, int16, 0),
            LogicalType::Int32 => collect_native!(Int32, int32, 0),
            LogicalType::Int64 => collect_native!(Int64, int64, 0),
            LogicalType::Float32 => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::Float32(OrderedFloat(v)) => out.push(*v),
                        Value::Null => out.push(0.0),
                        other => return Err(mismatch(data_type, other)),
                    }
                }
                Column::float32(out)
            }
            LogicalType::Float64 => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::Float64(OrderedFloat(v)) => out.push(*v),
                        Value::Null => out.push(0.0),
                        other => return Err(mismatch(data_type, other)),
                    }
                }
                Column::float64(out)
            }
            LogicalType::Decimal { precision, scale } => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::Decimal(d) if d.scale() == *scale => out.push(d.unscaled()),
                        Value::Decimal(d) => {
                            return Err(ColfileError::type_mismatch(format!(
                                "Decimal value has scale {} but column declares scale {}",
                                d.scale(),
                                scale
                            )))
                        }
                        Value::Null => out.push(0),
                        other => return Err(mismatch(data_type, other)),
                    }
                }
                Column::decimal(*precision, *scale, out)?
            }
            LogicalType::String => {
                let mut strings: Vec<&str> = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::String(s) => strings.push(s),
                        Value::Null => strings.push(""),
                        other => return Err(mismatch(data_type, other)),
                    }
                }
                Column::strings(strings)?
            }
            LogicalType::List(element) => {
                let mut offsets = Vec::with_capacity(values.len() + 1);
                offsets.push(0i32);
                let mut child_values = Vec::new();
                for value in values {
                    match value {
                        Value::List(items) => child_values.extend(items.iter().cloned()),
                        Value::Null => {}
                        other => return Err(mismatch(data_type, other)),
                    }
                    offsets.push(offset_from(child_values.len(), "list")?);
                }
                let child = Column::from_values(element, &child_values)?;
                Column::list(offsets, child)?
            }
            LogicalType::Struct(fields) => {
                let mut per_field: Vec<Vec<Value>> =
                    vec![Vec::with_capacity(values.len()); fields.len()];
                for value in values {
                    match value {
                        Value::Struct(members) if members.len() == fields.len() => {
                            for (idx, member) in members.iter().enumerate() {
                                per_field[idx].push(member.clone());
                            }
                        }
                        Value::Null => {
                            for field_values in per_field.iter_mut() {
                                field_values.push(Value::Null);
                            }
                        }
                        other => return Err(mismatch(data_type, other)),
                    }
                }
                let children = fields
                    .iter()
                    .zip(per_field.iter())
                    .map(|(field, field_values)| Column::from_values(&field.data_type, field_values))
                    .collect::<Result<Vec<_>>>()?;
                Column::structure_with_len(values.len(), children)?
            }
        };

        Ok(if has_nulls {
            column.with_validity(validity)
        } else {
            column
        })
    }

    // ---- capabilities ----

    pub fn len(&self) -> usize {
        with_native!(&self.data, v => v.len(), other => match other {
            ColumnData::Decimal(d) => d.values.len(),
            ColumnData::String(s) => s.len(),
            ColumnData::List(l) => l.len(),
            ColumnData::Struct(s) => s.len,
            _ => unreachable!(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn validity(&self) -> Option<&Bitmap> {
        self.validity.as_ref()
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.validity.as_ref().map(|v| v.get(idx)).unwrap_or(true)
    }

    pub fn null_count(&self) -> usize {
        self.validity.as_ref().map(Bitmap::count_unset).unwrap_or(0)
    }

    pub fn as_primitive<T: NativeType>(&self) -> Option<&[T]> {
        T::slice_of(&self.data)
    }

    pub fn as_decimal(&self) -> Option<&DecimalData> {
        match &self.data {
            ColumnData::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&StringData> {
        match &self.data {
            ColumnData::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListData> {
        match &self.data {
            ColumnData::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructData> {
        match &self.data {
            ColumnData::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Logical type derived from the physical representation; struct members
    /// get [`default_field_name`] names.
    pub fn logical_type(&self) -> LogicalType {
        match &self.data {
            ColumnData::Boolean(_) => LogicalType::Boolean,
            ColumnData::Int8(_) => LogicalType::Int8,
            ColumnData::Int16(_) => LogicalType::Int16,
            ColumnData::Int32(_) => LogicalType::Int32,
            ColumnData::Int64(_) => LogicalType::Int64,
            ColumnData::Float32(_) => LogicalType::Float32,
            ColumnData::Float64(_) => LogicalType::Float64,
            ColumnData::Decimal(d) => LogicalType::Decimal {
                precision: d.precision,
                scale: d.scale,
            },
            ColumnData::String(_) => LogicalType::String,
            ColumnData::List(l) => LogicalType::List(Box::new(l.child.logical_type())),
            ColumnData::Struct(s) => LogicalType::Struct(
                s.children
                    .iter()
                    .enumerate()
                    .map(|(idx, c)| StructField::new(default_field_name(idx), c.logical_type()))
                    .collect(),
            ),
        }
    }

    /// Value at row `idx`, or `Value::Null` for a null row
    pub fn value(&self, idx: usize) -> Value {
        if !self.is_valid(idx) {
            return Value::Null;
        }
        match &self.data {
            ColumnData::Boolean(v) => Value::Boolean(v[idx]),
            ColumnData::Int8(v) => Value::Int8(v[idx]),
            ColumnData::Int16(v) => Value::Int16(v[idx]),
            ColumnData::Int32(v) => Value::Int32(v[idx]),
            ColumnData::Int64(v) => Value::Int64(v[idx]),
            ColumnData::Float32(v) => Value::Float32(OrderedFloat(v[idx])),
            ColumnData::Float64(v) => Value::Float64(OrderedFloat(v[idx])),
            ColumnData::Decimal(d) => Value::Decimal(d.value(idx)),
            ColumnData::String(s) => Value::String(Arc::from(s.value(idx))),
            ColumnData::List(l) => {
                Value::List(l.value_range(idx).map(|j| l.child.value(j)).collect())
            }
            ColumnData::Struct(s) => {
                Value::Struct(s.children.iter().map(|c| c.value(idx)).collect())
            }
        }
    }

    /// Approximate in-memory footprint in bytes
    pub fn memory_size(&self) -> usize {
        let validity = self.validity.as_ref().map(|v| v.as_bytes().len()).unwrap_or(0);
        let values = with_native!(&self.data, v => std::mem::size_of_val(v.as_slice()), other => match other {
            ColumnData::Decimal(d) => d.values.len() * 16,
            ColumnData::String(s) => s.offsets.len() * 4 + s.data.len(),
            ColumnData::List(l) => l.offsets.len() * 4 + l.child.memory_size(),
            ColumnData::Struct(s) => s.children.iter().map(Column::memory_size).sum(),
            _ => unreachable!(),
        });
        validity + values
    }

    /// Check the structural invariants of this column and its children
    pub fn validate(&self) -> Result<()> {
        let len = self.len();
        if let Some(validity) = &self.validity {
            if validity.len() != len {
                return Err(ColfileError::encoding(format!(
                    "Validity mask has {} bits for {} rows",
                    validity.len(),
                    len
                )));
            }
        }
        match &self.data {
            ColumnData::Decimal(d) => {
                LogicalType::decimal(d.precision, d.scale)
                    .map_err(|e| ColfileError::encoding(e.to_string()))?;
                for (idx, unscaled) in d.values.iter().enumerate() {
                    if self.is_valid(idx) && d.value(idx).digits() > d.precision as u32 {
                        return Err(ColfileError::encoding(format!(
                            "Decimal value {} at row {} exceeds precision {}",
                            unscaled, idx, d.precision
                        )));
                    }
                }
            }
            ColumnData::String(s) => {
                check_offsets(&s.offsets, s.data.len(), "string")?;
                if let Some(bad) = s.offsets.iter().find(|o| !s.data.is_char_boundary(**o as usize))
                {
                    return Err(ColfileError::encoding(format!(
                        "String offset {} is not on a character boundary",
                        bad
                    )));
                }
            }
            ColumnData::List(l) => {
                check_offsets(&l.offsets, l.child.len(), "list")?;
                l.child.validate()?;
            }
            ColumnData::Struct(s) => {
                for child in &s.children {
                    if child.len() != s.len {
                        return Err(ColfileError::encoding(format!(
                            "Struct child has {} rows, expected {}",
                            child.len(),
                            s.len
                        )));
                    }
                    child.validate()?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Deep copy of rows `[offset, offset + len)`
    pub fn slice(&self, offset: usize, len: usize) -> Column {
        debug_assert!(offset + len <= self.len());
        let validity = self
            .validity
            .as_ref()
            .map(|v| v.slice(offset, len))
            .filter(|v| v.count_unset() > 0);
        let data = with_native!(&self.data, v => native_slice(v, offset, len), other => match other {
            ColumnData::Decimal(d) => ColumnData::Decimal(DecimalData {
                precision: d.precision,
                scale: d.scale,
                values: d.values[offset..offset + len].to_vec(),
            }),
            ColumnData::String(s) => {
                let start = s.offsets[offset];
                let end = s.offsets[offset + len];
                ColumnData::String(StringData {
                    offsets: s.offsets[offset..=offset + len].iter().map(|o| o - start).collect(),
                    data: s.data[start as usize..end as usize].to_string(),
                })
            }
            ColumnData::List(l) => {
                let start = l.offsets[offset];
                let end = l.offsets[offset + len];
                ColumnData::List(ListData {
                    offsets: l.offsets[offset..=offset + len].iter().map(|o| o - start).collect(),
                    child: Box::new(l.child.slice(start as usize, (end - start) as usize)),
                })
            }
            ColumnData::Struct(s) => ColumnData::Struct(StructData {
                len,
                children: s.children.iter().map(|c| c.slice(offset, len)).collect(),
            }),
            _ => unreachable!(),
        });
        Column { data, validity }
    }

    /// Concatenate columns of identical shape, in order
    pub fn concat(columns: &[&Column]) -> Result<Column> {
        let first = columns
            .first()
            .ok_or_else(|| ColfileError::invalid_argument("Cannot concatenate zero columns"))?;
        let data_type = first.logical_type();
        if let Some(other) = columns.iter().find(|c| !c.logical_type().same_shape(&data_type)) {
            return Err(ColfileError::schema(format!(
                "Cannot concatenate {} with {}",
                data_type,
                other.logical_type()
            )));
        }

        let total: usize = columns.iter().map(|c| c.len()).sum();
        // masks without nulls are dropped so equal rows always encode alike
        let validity = if columns.iter().any(|c| c.null_count() > 0) {
            let mut bitmap = Bitmap::with_capacity(total);
            for column in columns {
                match &column.validity {
                    Some(v) => bitmap.extend_from(v, 0, v.len()),
                    None => bitmap.extend_from(&Bitmap::filled(column.len(), true), 0, column.len()),
                }
            }
            Some(bitmap)
        } else {
            None
        };

        macro_rules! concat_native {
            ($variant:ident) => {{
                let mut out = Vec::with_capacity(total);
                for column in columns {
                    if let ColumnData::$variant(v) = &column.data {
                        out.extend_from_slice(v);
                    }
                }
                ColumnData::$variant(out)
            }};
        }

        let data = match &first.data {
            ColumnData::Boolean(_) => concat_native!(Boolean),
            ColumnData::Int8(_) => concat_native!(Int8),
            ColumnData::Int16(_) => concat_native!(Int16),
            ColumnData::Int32(_) => concat_native!(Int32),
            ColumnData::Int64(_) => concat_native!(Int64),
            ColumnData::Float32(_) => concat_native!(Float32),
            ColumnData::Float64(_) => concat_native!(Float64),
            ColumnData::Decimal(d) => {
                let mut values = Vec::with_capacity(total);
                for column in columns {
                    if let Some(other) = column.as_decimal() {
                        values.extend_from_slice(&other.values);
                    }
                }
                ColumnData::Decimal(DecimalData {
                    precision: d.precision,
                    scale: d.scale,
                    values,
                })
            }
            ColumnData::String(_) => {
                let mut offsets = Vec::with_capacity(total + 1);
                offsets.push(0i32);
                let mut data = String::new();
                for column in columns {
                    if let Some(s) = column.as_strings() {
                        let start = s.offsets[0] as usize;
                        for end in &s.offsets[1..] {
                            let offset = data.len() + *end as usize - start;
                            offsets.push(offset_from(offset, "string")?);
                        }
                        data.push_str(&s.data[start..s.offsets[s.len()] as usize]);
                    }
                }
                ColumnData::String(StringData { offsets, data })
            }
            ColumnData::List(_) => {
                let mut offsets = Vec::with_capacity(total + 1);
                offsets.push(0i32);
                let mut children = Vec::with_capacity(columns.len());
                let mut base = 0usize;
                for column in columns {
                    if let Some(l) = column.as_list() {
                        let start = l.offsets[0] as usize;
                        for end in &l.offsets[1..] {
                            offsets.push(offset_from(base + *end as usize - start, "list")?);
                        }
                        base += l.offsets[l.len()] as usize - start;
                        children.push(l.child.as_ref());
                    }
                }
                ColumnData::List(ListData {
                    offsets,
                    child: Box::new(Column::concat(&children)?),
                })
            }
            ColumnData::Struct(s) => {
                let children = (0..s.children.len())
                    .map(|idx| {
                        let parts: Vec<&Column> = columns
                            .iter()
                            .filter_map(|c| c.as_struct().map(|s| &s.children[idx]))
                            .collect();
                        Column::concat(&parts)
                    })
                    .collect::<Result<Vec<_>>>()?;
                ColumnData::Struct(StructData {
                    len: total,
                    children,
                })
            }
        };
        Ok(Column { data, validity })
    }

    /// True when a null list row, here or in any nested list, still spans
    /// child rows
    pub(crate) fn has_null_list_spans(&self) -> bool {
        match &self.data {
            ColumnData::List(l) => {
                (0..l.len()).any(|i| !self.is_valid(i) && !l.value_range(i).is_empty())
                    || l.child.has_null_list_spans()
            }
            ColumnData::Struct(s) => s.children.iter().any(Column::has_null_list_spans),
            _ => false,
        }
    }

    /// Rewrite null list rows to empty ranges, dropping the child rows they
    /// pointed at. Applied recursively through structs and nested lists.
    pub(crate) fn with_null_lists_collapsed(&self) -> Result<Column> {
        if !self.has_null_list_spans() {
            return Ok(self.clone());
        }
        let data = match &self.data {
            ColumnData::List(l) => {
                let mut offsets = Vec::with_capacity(l.offsets.len());
                offsets.push(0i32);
                let mut runs: Vec<(usize, usize)> = Vec::new();
                let mut kept = 0usize;
                for idx in 0..l.len() {
                    let range = l.value_range(idx);
                    if self.is_valid(idx) && !range.is_empty() {
                        match runs.last_mut() {
                            Some((_, end)) if *end == range.start => *end = range.end,
                            _ => runs.push((range.start, range.end)),
                        }
                        kept += range.len();
                    }
                    offsets.push(offset_from(kept, "list")?);
                }

                let child = if runs.is_empty() {
                    l.child.slice(0, 0)
                } else {
                    let parts: Vec<Column> = runs
                        .iter()
                        .map(|(start, end)| l.child.slice(*start, end - start))
                        .collect();
                    let refs: Vec<&Column> = parts.iter().collect();
                    Column::concat(&refs)?
                };
                ColumnData::List(ListData {
                    offsets,
                    child: Box::new(child.with_null_lists_collapsed()?),
                })
            }
            ColumnData::Struct(s) => ColumnData::Struct(StructData {
                len: s.len,
                children: s
                    .children
                    .iter()
                    .map(Column::with_null_lists_collapsed)
                    .collect::<Result<Vec<_>>>()?,
            }),
            _ => self.data.clone(),
        };
        Ok(Column {
            data,
            validity: self.validity.clone(),
        })
    }

    /// Estimated in-memory bytes of every row, consistent with
    /// [`Column::memory_size`] apart from validity bits and the leading offset
    pub fn row_sizes(&self) -> Vec<usize> {
        let len = self.len();
        with_native!(&self.data, v => vec![width_of(v); len], other => match other {
            ColumnData::Decimal(_) => vec![16; len],
            ColumnData::String(s) => (0..len)
                .map(|i| 4 + (s.offsets[i + 1] - s.offsets[i]) as usize)
                .collect(),
            ColumnData::List(l) => {
                let child = l.child.row_sizes();
                (0..len)
                    .map(|i| 4 + child[l.value_range(i)].iter().sum::<usize>())
                    .collect()
            }
            ColumnData::Struct(s) => {
                let mut sizes = vec![0; len];
                for child in &s.children {
                    for (total, size) in sizes.iter_mut().zip(child.row_sizes()) {
                        *total += size;
                    }
                }
                sizes
            }
            _ => unreachable!(),
        })
    }
}

impl PartialEq for Column {
    /// Row-wise logical equality: same type, same null positions, equal
    /// values in valid rows
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.logical_type() == other.logical_type()
            && (0..self.len()).all(|i| {
                self.is_valid(i) == other.is_valid(i)
                    && (!self.is_valid(i) || self.value(i) == other.value(i))
            })
    }
}

fn native_slice<T: Copy>(values: &[T], offset: usize, len: usize) -> ColumnData
where
    Vec<T>: IntoColumnData,
{
    values[offset..offset + len].to_vec().into_column_data()
}

trait IntoColumnData {
    fn into_column_data(self) -> ColumnData;
}

macro_rules! into_column_data {
    ($t:ty, $variant:ident) => {
        impl IntoColumnData for Vec<$t> {
            fn into_column_data(self) -> ColumnData {
                ColumnData::$variant(self)
            }
        }
    };
}

into_column_data!(bool, Boolean);
into_column_data!(i8, Int8);
into_column_data!(i16, Int16);
into_column_data!(i32, Int32);
into_column_data!(i64, Int64);
into_column_data!(f32, Float32);
into_column_data!(f64, Float64);

fn width_of<T>(_: &[T]) -> usize {
    std::mem::size_of::<T>()
}

/// Narrow a byte or element count to an `i32` offset
pub(crate) fn offset_from(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        ColfileError::encoding(format!(
            "{} offsets overflow: {} exceeds {}",
            what,
            len,
            i32::MAX
        ))
    })
}

fn check_offsets(offsets: &[i32], child_len: usize, what: &str) -> Result<()> {
    if offsets.is_empty() {
        return Err(ColfileError::encoding(format!(
            "{} offsets must have at least one entry",
            what
        )));
    }
    if offsets[0] != 0 {
        return Err(ColfileError::encoding(format!(
            "{} offsets must start at 0, got {}",
            what, offsets[0]
        )));
    }
    if let Some(pos) = offsets.windows(2).position(|w| w[0] > w[1]) {
        return Err(ColfileError::encoding(format!(
            "{} offsets decrease at row {}",
            what, pos
        )));
    }
    let last = offsets[offsets.len() - 1];
    if last as usize != child_len {
        return Err(ColfileError::encoding(format!(
            "{} offsets end at {} but data has {} entries",
            what, last, child_len
        )));
    }
    Ok(())
}

fn mismatch(expected: &LogicalType, value: &Value) -> ColfileError {
    ColfileError::type_mismatch(format!(
        "Expected {} value, got {}",
        expected,
        value.type_name()
    ))
}
