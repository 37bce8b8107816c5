use colfile_core::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use test_helpers::*;

const ALL_CODECS: [CompressionCodec; 4] = [
    CompressionCodec::Uncompressed,
    CompressionCodec::Snappy,
    CompressionCodec::Lz4,
    CompressionCodec::Zstd,
];

/// Highly repetitive data that every real codec should shrink
fn repetitive_table() -> Table {
    Table::try_new(vec![
        Column::int64((0..10_000).map(|i| i % 4).collect()),
        Column::strings((0..10_000).map(|i| if i % 2 == 0 { "aaaa" } else { "bbbb" })).unwrap(),
    ])
    .unwrap()
}

#[test]
fn test_all_codecs_roundtrip() {
    let table = repetitive_table();
    for codec in ALL_CODECS {
        let bytes = write_bytes(
            &table,
            &TableInputMetadata::from_names(["n", "s"]),
            WriterOptions::new().with_compression(codec),
        );
        let reader = Reader::new(bytes).unwrap();
        for chunk in &reader.metadata().row_groups[0].columns {
            assert_eq!(chunk.codec, codec);
        }
        assert_eq!(reader.read().unwrap(), table, "codec {}", codec);
    }
}

#[test]
fn test_compression_shrinks_repetitive_data() {
    let table = repetitive_table();
    let sizes: Vec<u64> = ALL_CODECS
        .iter()
        .map(|codec| {
            let bytes = write_bytes(
                &table,
                &TableInputMetadata::from_names(["n", "s"]),
                WriterOptions::new()
                    .with_compression(*codec)
                    .with_statistics(false),
            );
            let metadata = read_metadata(&bytes).unwrap();
            metadata.row_groups[0].columns[0].compressed_size
        })
        .collect();

    let uncompressed = sizes[0];
    for (codec, size) in ALL_CODECS.iter().zip(&sizes).skip(1) {
        assert!(
            *size < uncompressed / 2,
            "{} produced {} bytes vs {} uncompressed",
            codec,
            size,
            uncompressed
        );
    }
}

#[test]
fn test_uncompressed_sizes_match() {
    let bytes = write_bytes(
        &repetitive_table(),
        &TableInputMetadata::from_names(["n", "s"]),
        WriterOptions::new().with_compression(CompressionCodec::Uncompressed),
    );
    let metadata = read_metadata(&bytes).unwrap();
    for chunk in &metadata.row_groups[0].columns {
        assert_eq!(chunk.compressed_size, chunk.uncompressed_size);
        assert_eq!(chunk.frame_len(), chunk.compressed_size + 9);
    }
}

#[test]
fn test_codec_names() {
    assert_eq!(CompressionCodec::from_str("SNAPPY").unwrap(), CompressionCodec::Snappy);
    assert_eq!(CompressionCodec::from_str("none").unwrap(), CompressionCodec::Uncompressed);
    assert_eq!("zstd".parse::<CompressionCodec>().unwrap(), CompressionCodec::Zstd);
    assert_eq!(
        "brotli".parse::<CompressionCodec>().unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    for codec in ALL_CODECS {
        assert_eq!(codec.to_string().parse::<CompressionCodec>().unwrap(), codec);
    }
    assert_eq!(CompressionCodec::default(), CompressionCodec::Uncompressed);
    assert_eq!(WriterOptions::default().compression(), CompressionCodec::Snappy);
}

/// Backend that only stores data verbatim and counts calls
#[derive(Debug, Default)]
struct StoreOnlyCodec {
    decompressed: AtomicUsize,
}

impl Codec for StoreOnlyCodec {
    fn compress(&self, codec: CompressionCodec, input: &[u8]) -> Result<Vec<u8>> {
        DefaultCodec.compress(codec, input)
    }

    fn decompress(
        &self,
        codec: CompressionCodec,
        input: &[u8],
        expected_size: usize,
    ) -> Result<Vec<u8>> {
        self.decompressed.fetch_add(1, Ordering::SeqCst);
        DefaultCodec.decompress(codec, input, expected_size)
    }

    fn supports(&self, codec: CompressionCodec) -> bool {
        codec == CompressionCodec::Uncompressed
    }
}

#[test]
fn test_custom_codec_backend() {
    let backend = Arc::new(StoreOnlyCodec::default());

    let err = ChunkedWriter::open(
        WriterOptions::new()
            .with_codec(backend.clone())
            .with_compression(CompressionCodec::Zstd),
        Vec::new(),
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let table = create_test_table(20);
    let bytes = write_bytes(
        &table,
        &create_test_metadata(),
        WriterOptions::new()
            .with_codec(backend.clone())
            .with_compression(CompressionCodec::Uncompressed),
    );

    let reader = Reader::new(bytes).unwrap();
    let read = reader
        .read_with_options(&ReaderOptions::new().with_codec(backend.clone()))
        .unwrap();
    assert_eq!(read, table);
    assert_eq!(backend.decompressed.load(Ordering::SeqCst), 4);
}

#[test]
fn test_corrupt_compressed_payload() {
    let bytes = write_bytes(
        &repetitive_table(),
        &TableInputMetadata::from_names(["n", "s"]),
        WriterOptions::new().with_compression(CompressionCodec::Zstd),
    );
    let metadata = read_metadata(&bytes).unwrap();
    let chunk = &metadata.row_groups[0].columns[0];
    // Damage the zstd frame magic right after the chunk header
    let corrupted = corrupt_byte(&bytes, chunk.offset as usize + 9);

    let err = read_table(corrupted, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptFile);
}
