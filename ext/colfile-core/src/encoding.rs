//! Column chunk encoding.
//!
//! A chunk is one top-level column of one row group, framed as
//!
//! ```text
//! u32 uncompressed_len | u32 compressed_len | u8 codec | payload
//! ```
//!
//! The payload is written recursively per node: a type tag (plus decimal
//! precision and scale), a validity flag with an optional bit-packed mask,
//! then the values. Row counts are never stored in the payload; they come
//! from the footer for top-level nodes and from offsets or the parent for
//! children.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::bitmap::Bitmap;
use crate::compression::{Codec, CompressionCodec};
use crate::metadata::{ColumnChunkMetadata, CHUNK_HEADER_LEN};
use crate::{ColfileError, Column, ColumnData, LogicalType, Result};

const TAG_BOOLEAN: u8 = 0;
const TAG_INT8: u8 = 1;
const TAG_INT16: u8 = 2;
const TAG_INT32: u8 = 3;
const TAG_INT64: u8 = 4;
const TAG_FLOAT32: u8 = 5;
const TAG_FLOAT64: u8 = 6;
const TAG_DECIMAL: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_STRUCT: u8 = 10;

/// A framed, possibly compressed column chunk ready to be appended to a sink
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub frame: Vec<u8>,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub codec: CompressionCodec,
}

/// Encode and frame one column
pub fn encode_column_chunk(
    column: &Column,
    codec: CompressionCodec,
    backend: &dyn Codec,
) -> Result<EncodedChunk> {
    let mut payload = BytesMut::with_capacity(column.memory_size() + 16);
    encode_node(column, &mut payload)?;

    let compressed = backend.compress(codec, &payload)?;
    let uncompressed_len = frame_len_u32(payload.len())?;
    let compressed_len = frame_len_u32(compressed.len())?;

    let mut frame = Vec::with_capacity(CHUNK_HEADER_LEN + compressed.len());
    frame.put_u32_le(uncompressed_len);
    frame.put_u32_le(compressed_len);
    frame.put_u8(codec.id());
    frame.extend_from_slice(&compressed);

    trace!(
        rows = column.len(),
        uncompressed = payload.len(),
        compressed = compressed.len(),
        %codec,
        "encoded column chunk"
    );
    Ok(EncodedChunk {
        frame,
        uncompressed_size: uncompressed_len as u64,
        compressed_size: compressed_len as u64,
        codec,
    })
}

/// Decode one framed chunk, checking it against its footer entry and the
/// expected logical type
pub fn decode_column_chunk(
    frame: &[u8],
    chunk: &ColumnChunkMetadata,
    logical_type: &LogicalType,
    backend: &dyn Codec,
) -> Result<Column> {
    if frame.len() as u64 != chunk.frame_len() {
        return Err(ColfileError::corrupt(format!(
            "Chunk frame is {} bytes, footer records {}",
            frame.len(),
            chunk.frame_len()
        )));
    }
    let mut header = &frame[..CHUNK_HEADER_LEN];
    let uncompressed_len = header.get_u32_le() as u64;
    let compressed_len = header.get_u32_le() as u64;
    let codec = CompressionCodec::from_id(header.get_u8())?;
    if uncompressed_len != chunk.uncompressed_size
        || compressed_len != chunk.compressed_size
        || codec != chunk.codec
    {
        return Err(ColfileError::corrupt(format!(
            "Chunk header ({} / {} bytes, {}) disagrees with footer ({} / {} bytes, {})",
            uncompressed_len,
            compressed_len,
            codec,
            chunk.uncompressed_size,
            chunk.compressed_size,
            chunk.codec
        )));
    }

    let payload = backend.decompress(
        codec,
        &frame[CHUNK_HEADER_LEN..],
        uncompressed_len as usize,
    )?;
    let mut buf = payload.as_slice();
    let column = decode_node(&mut buf, chunk.num_rows as usize, logical_type)?;
    if buf.has_remaining() {
        return Err(ColfileError::corrupt(format!(
            "{} trailing bytes after chunk payload",
            buf.remaining()
        )));
    }
    Ok(column)
}

fn frame_len_u32(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ColfileError::encoding(format!("Column chunk of {} bytes exceeds 4 GiB", len)))
}

fn encode_node(column: &Column, buf: &mut BytesMut) -> Result<()> {
    buf.put_u8(type_tag(column.data()));
    if let Some(d) = column.as_decimal() {
        buf.put_u8(d.precision());
        buf.put_i8(d.scale());
    }

    match column.validity() {
        Some(validity) => {
            buf.put_u8(1);
            buf.put_slice(validity.as_bytes());
        }
        None => buf.put_u8(0),
    }

    match column.data() {
        ColumnData::Boolean(values) => {
            let packed: Bitmap = values.iter().copied().collect();
            buf.put_slice(packed.as_bytes());
        }
        ColumnData::Int8(values) => values.iter().for_each(|v| buf.put_i8(*v)),
        ColumnData::Int16(values) => values.iter().for_each(|v| buf.put_i16_le(*v)),
        ColumnData::Int32(values) => values.iter().for_each(|v| buf.put_i32_le(*v)),
        ColumnData::Int64(values) => values.iter().for_each(|v| buf.put_i64_le(*v)),
        ColumnData::Float32(values) => values.iter().for_each(|v| buf.put_f32_le(*v)),
        ColumnData::Float64(values) => values.iter().for_each(|v| buf.put_f64_le(*v)),
        ColumnData::Decimal(d) => d.values().iter().for_each(|v| buf.put_i128_le(*v)),
        ColumnData::String(s) => {
            put_offsets(buf, s.offsets());
            let start = s.offsets()[0] as usize;
            buf.put_slice(&s.data().as_bytes()[start..]);
        }
        ColumnData::List(l) => {
            put_offsets(buf, l.offsets());
            let base = l.offsets()[0] as usize;
            if base == 0 && l.offsets()[l.len()] as usize == l.child().len() {
                encode_node(l.child(), buf)?;
            } else {
                let end = l.offsets()[l.len()] as usize;
                encode_node(&l.child().slice(base, end - base), buf)?;
            }
        }
        ColumnData::Struct(s) => {
            buf.put_u32_le(s.children().len() as u32);
            for child in s.children() {
                encode_node(child, buf)?;
            }
        }
    }
    Ok(())
}

/// Offsets are written rebased so the first entry is always zero
fn put_offsets(buf: &mut BytesMut, offsets: &[i32]) {
    let base = offsets[0];
    for offset in offsets {
        buf.put_u32_le((offset - base) as u32);
    }
}

fn type_tag(data: &ColumnData) -> u8 {
    match data {
        ColumnData::Boolean(_) => TAG_BOOLEAN,
        ColumnData::Int8(_) => TAG_INT8,
        ColumnData::Int16(_) => TAG_INT16,
        ColumnData::Int32(_) => TAG_INT32,
        ColumnData::Int64(_) => TAG_INT64,
        ColumnData::Float32(_) => TAG_FLOAT32,
        ColumnData::Float64(_) => TAG_FLOAT64,
        ColumnData::Decimal(_) => TAG_DECIMAL,
        ColumnData::String(_) => TAG_STRING,
        ColumnData::List(_) => TAG_LIST,
        ColumnData::Struct(_) => TAG_STRUCT,
    }
}

fn expected_tag(logical_type: &LogicalType) -> u8 {
    match logical_type {
        LogicalType::Boolean => TAG_BOOLEAN,
        LogicalType::Int8 => TAG_INT8,
        LogicalType::Int16 => TAG_INT16,
        LogicalType::Int32 => TAG_INT32,
        LogicalType::Int64 => TAG_INT64,
        LogicalType::Float32 => TAG_FLOAT32,
        LogicalType::Float64 => TAG_FLOAT64,
        LogicalType::Decimal { .. } => TAG_DECIMAL,
        LogicalType::String => TAG_STRING,
        LogicalType::List(_) => TAG_LIST,
        LogicalType::Struct(_) => TAG_STRUCT,
    }
}

fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_BOOLEAN => "Boolean",
        TAG_INT8 => "Int8",
        TAG_INT16 => "Int16",
        TAG_INT32 => "Int32",
        TAG_INT64 => "Int64",
        TAG_FLOAT32 => "Float32",
        TAG_FLOAT64 => "Float64",
        TAG_DECIMAL => "Decimal",
        TAG_STRING => "String",
        TAG_LIST => "List",
        TAG_STRUCT => "Struct",
        _ => "unknown",
    }
}

fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ColfileError::corrupt(format!(
            "Chunk payload truncated: needed {} bytes, {} left",
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    ensure(buf, len)?;
    let slice: &'a [u8] = *buf;
    let (head, rest) = slice.split_at(len);
    *buf = rest;
    Ok(head)
}

fn fixed_bytes(rows: usize, width: usize) -> Result<usize> {
    rows.checked_mul(width)
        .ok_or_else(|| ColfileError::corrupt(format!("Row count {} overflows", rows)))
}

fn corrupt_from(err: ColfileError) -> ColfileError {
    ColfileError::corrupt(err.to_string())
}

fn decode_node(buf: &mut &[u8], rows: usize, logical_type: &LogicalType) -> Result<Column> {
    ensure(buf, 1)?;
    let tag = buf.get_u8();
    if tag != expected_tag(logical_type) {
        return Err(ColfileError::type_mismatch(format!(
            "Chunk holds {} data but schema declares {}",
            tag_name(tag),
            logical_type
        )));
    }

    let decimal_params = if tag == TAG_DECIMAL {
        ensure(buf, 2)?;
        let precision = buf.get_u8();
        let scale = buf.get_i8();
        if let LogicalType::Decimal {
            precision: p,
            scale: s,
        } = logical_type
        {
            if *p != precision || *s != scale {
                return Err(ColfileError::type_mismatch(format!(
                    "Chunk holds Decimal({}, {}) but schema declares {}",
                    precision, scale, logical_type
                )));
            }
        }
        Some((precision, scale))
    } else {
        None
    };

    ensure(buf, 1)?;
    let validity = match buf.get_u8() {
        0 => None,
        1 => {
            let bytes = take(buf, rows.div_ceil(8))?;
            Some(
                Bitmap::from_packed(bytes.to_vec(), rows)
                    .ok_or_else(|| ColfileError::corrupt("Validity mask has the wrong length"))?,
            )
        }
        other => {
            return Err(ColfileError::corrupt(format!(
                "Invalid validity flag {}",
                other
            )))
        }
    };

    macro_rules! read_fixed {
        ($ctor:ident, $width:expr, $get:ident) => {{
            let mut bytes = take(buf, fixed_bytes(rows, $width)?)?;
            let values = (0..rows).map(|_| bytes.$get()).collect();
            Column::$ctor(values)
        }};
    }

    let column = match logical_type {
        LogicalType::Boolean => {
            let bytes = take(buf, rows.div_ceil(8))?;
            let packed = Bitmap::from_packed(bytes.to_vec(), rows)
                .ok_or_else(|| ColfileError::corrupt("Boolean values have the wrong length"))?;
            Column::boolean(packed.iter().collect())
        }
        LogicalType::Int8 => read_fixed!(int8, 1, get_i8),
        LogicalType::Int16 => read_fixed!(int16, 2, get_i16_le),
        LogicalType::Int32 => read_fixed!(int32, 4, get_i32_le),
        LogicalType::Int64 => read_fixed!(int64, 8, get_i64_le),
        LogicalType::Float32 => read_fixed!(float32, 4, get_f32_le),
        LogicalType::Float64 => read_fixed!(float64, 8, get_f64_le),
        LogicalType::Decimal { .. } => {
            let (precision, scale) = decimal_params
                .ok_or_else(|| ColfileError::corrupt("Decimal parameters missing"))?;
            let mut bytes = take(buf, fixed_bytes(rows, 16)?)?;
            let values = (0..rows).map(|_| bytes.get_i128_le()).collect();
            Column::decimal(precision, scale, values).map_err(corrupt_from)?
        }
        LogicalType::String => {
            let offsets = read_offsets(buf, rows)?;
            let data_len = offsets[rows] as usize;
            let bytes = take(buf, data_len)?;
            let data = String::from_utf8(bytes.to_vec())
                .map_err(|e| ColfileError::corrupt(format!("Invalid UTF-8 in string chunk: {}", e)))?;
            Column::strings_from_parts(offsets, data).map_err(corrupt_from)?
        }
        LogicalType::List(element) => {
            let offsets = read_offsets(buf, rows)?;
            let child_rows = offsets[rows] as usize;
            let child = decode_node(buf, child_rows, element)?;
            Column::list(offsets, child).map_err(corrupt_from)?
        }
        LogicalType::Struct(fields) => {
            ensure(buf, 4)?;
            let count = buf.get_u32_le() as usize;
            if count != fields.len() {
                return Err(ColfileError::type_mismatch(format!(
                    "Chunk holds a struct of {} fields but schema declares {}",
                    count, logical_type
                )));
            }
            let children = fields
                .iter()
                .map(|field| decode_node(buf, rows, &field.data_type))
                .collect::<Result<Vec<_>>>()?;
            Column::structure_with_len(rows, children).map_err(corrupt_from)?
        }
    };

    Ok(match validity {
        Some(validity) => column.with_validity(validity),
        None => column,
    })
}

fn read_offsets(buf: &mut &[u8], rows: usize) -> Result<Vec<i32>> {
    let count = rows
        .checked_add(1)
        .ok_or_else(|| ColfileError::corrupt("Row count overflows"))?;
    let mut bytes = take(buf, fixed_bytes(count, 4)?)?;
    let mut offsets = Vec::with_capacity(count);
    let mut prev = 0i32;
    for idx in 0..count {
        let raw = bytes.get_u32_le();
        let offset = i32::try_from(raw)
            .map_err(|_| ColfileError::corrupt(format!("Offset {} is out of range", raw)))?;
        if (idx == 0 && offset != 0) || offset < prev {
            return Err(ColfileError::corrupt(format!(
                "Malformed offsets at row {}",
                idx
            )));
        }
        prev = offset;
        offsets.push(offset);
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::DefaultCodec;
    use crate::types::StructField;

    fn chunk_metadata(encoded: &EncodedChunk, rows: usize) -> ColumnChunkMetadata {
        ColumnChunkMetadata {
            offset: 4,
            compressed_size: encoded.compressed_size,
            uncompressed_size: encoded.uncompressed_size,
            codec: encoded.codec,
            num_rows: rows as u64,
            decoded_size: 0,
            statistics: vec![],
        }
    }

    fn roundtrip(column: &Column, codec: CompressionCodec) -> Column {
        let encoded = encode_column_chunk(column, codec, &DefaultCodec).unwrap();
        let meta = chunk_metadata(&encoded, column.len());
        decode_column_chunk(&encoded.frame, &meta, &column.logical_type(), &DefaultCodec).unwrap()
    }

    #[test]
    fn test_nested_chunk_roundtrip() {
        let list = Column::list(
            vec![0, 2, 2, 5],
            Column::strings(["a", "bb", "", "ccc", "d"])
                .unwrap()
                .with_valid_rows([true, true, false, true, true]),
        )
        .unwrap()
        .with_valid_rows([true, false, true]);
        let column = Column::structure(vec![
            list,
            Column::decimal128(vec![1, -1, 0], -12),
            Column::boolean(vec![true, false, true]),
        ])
        .unwrap();

        for codec in [CompressionCodec::Uncompressed, CompressionCodec::Zstd] {
            assert_eq!(roundtrip(&column, codec), column);
        }
    }

    #[test]
    fn test_sliced_list_is_rebased() {
        let list = Column::list(vec![0, 1, 3, 6], Column::int64(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let sliced = list.slice(1, 2);
        assert_eq!(roundtrip(&sliced, CompressionCodec::Uncompressed), sliced);
    }

    #[test]
    fn test_type_tag_mismatch() {
        let column = Column::int32(vec![1, 2, 3]);
        let encoded =
            encode_column_chunk(&column, CompressionCodec::Uncompressed, &DefaultCodec).unwrap();
        let meta = chunk_metadata(&encoded, 3);
        let err = decode_column_chunk(&encoded.frame, &meta, &LogicalType::Int64, &DefaultCodec)
            .unwrap_err();
        assert!(matches!(err, ColfileError::TypeMismatch(_)));

        let decimal = Column::decimal128(vec![1], 12);
        let encoded =
            encode_column_chunk(&decimal, CompressionCodec::Uncompressed, &DefaultCodec).unwrap();
        let meta = chunk_metadata(&encoded, 1);
        let declared = LogicalType::decimal(38, -12).unwrap();
        let err =
            decode_column_chunk(&encoded.frame, &meta, &declared, &DefaultCodec).unwrap_err();
        assert!(matches!(err, ColfileError::TypeMismatch(_)));

        let structure = Column::structure(vec![Column::int32(vec![1])]).unwrap();
        let encoded =
            encode_column_chunk(&structure, CompressionCodec::Uncompressed, &DefaultCodec)
                .unwrap();
        let meta = chunk_metadata(&encoded, 1);
        let declared = LogicalType::Struct(vec![
            StructField::new("a", LogicalType::Int32),
            StructField::new("b", LogicalType::Int32),
        ]);
        let err =
            decode_column_chunk(&encoded.frame, &meta, &declared, &DefaultCodec).unwrap_err();
        assert!(matches!(err, ColfileError::TypeMismatch(_)));
    }

    #[test]
    fn test_header_disagreement_is_corrupt() {
        let column = Column::int64(vec![1, 2, 3]);
        let encoded =
            encode_column_chunk(&column, CompressionCodec::Snappy, &DefaultCodec).unwrap();
        let mut meta = chunk_metadata(&encoded, 3);
        meta.uncompressed_size += 1;
        let err = decode_column_chunk(&encoded.frame, &meta, &LogicalType::Int64, &DefaultCodec)
            .unwrap_err();
        assert!(matches!(err, ColfileError::CorruptFile(_)));

        let meta = chunk_metadata(&encoded, 3);
        let err = decode_column_chunk(
            &encoded.frame[..encoded.frame.len() - 1],
            &meta,
            &LogicalType::Int64,
            &DefaultCodec,
        )
        .unwrap_err();
        assert!(matches!(err, ColfileError::CorruptFile(_)));
    }

    #[test]
    fn test_row_count_disagreement_is_corrupt() {
        let column = Column::int16(vec![1, 2, 3, 4]);
        let encoded =
            encode_column_chunk(&column, CompressionCodec::Uncompressed, &DefaultCodec).unwrap();

        // fewer rows than encoded leaves trailing bytes
        let meta = chunk_metadata(&encoded, 3);
        let err = decode_column_chunk(&encoded.frame, &meta, &LogicalType::Int16, &DefaultCodec)
            .unwrap_err();
        assert!(matches!(err, ColfileError::CorruptFile(_)));

        // more rows than encoded runs out of payload
        let meta = chunk_metadata(&encoded, 5);
        let err = decode_column_chunk(&encoded.frame, &meta, &LogicalType::Int16, &DefaultCodec)
            .unwrap_err();
        assert!(matches!(err, ColfileError::CorruptFile(_)));
    }

    #[test]
    fn test_empty_column() {
        let column = Column::list(vec![0], Column::strings(Vec::<&str>::new()).unwrap()).unwrap();
        assert_eq!(roundtrip(&column, CompressionCodec::Lz4), column);
    }
}
