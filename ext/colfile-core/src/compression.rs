//! Chunk compression.
//!
//! The container records a [`CompressionCodec`] id per column chunk and hands
//! the bytes to a [`Codec`]; the algorithms themselves live in external crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ColfileError, Result};

const ZSTD_DEFAULT_LEVEL: i32 = 3;

/// Codec id stored in every chunk frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionCodec {
    #[default]
    Uncompressed = 0,
    Snappy = 1,
    Lz4 = 2,
    Zstd = 3,
}

impl CompressionCodec {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(CompressionCodec::Uncompressed),
            1 => Ok(CompressionCodec::Snappy),
            2 => Ok(CompressionCodec::Lz4),
            3 => Ok(CompressionCodec::Zstd),
            other => Err(ColfileError::corrupt(format!("Unknown codec id {}", other))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionCodec::Uncompressed => "uncompressed",
            CompressionCodec::Snappy => "snappy",
            CompressionCodec::Lz4 => "lz4",
            CompressionCodec::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionCodec {
    type Err = ColfileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Ok(CompressionCodec::Uncompressed),
            "snappy" => Ok(CompressionCodec::Snappy),
            "lz4" => Ok(CompressionCodec::Lz4),
            "zstd" => Ok(CompressionCodec::Zstd),
            other => Err(ColfileError::invalid_argument(format!(
                "Unknown compression codec '{}'",
                other
            ))),
        }
    }
}

/// Compression backend used by writers and readers
pub trait Codec: Send + Sync + fmt::Debug {
    fn compress(&self, codec: CompressionCodec, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `input`; the result must be exactly `expected_size` bytes
    fn decompress(
        &self,
        codec: CompressionCodec,
        input: &[u8],
        expected_size: usize,
    ) -> Result<Vec<u8>>;

    /// Whether this backend can handle `codec`
    fn supports(&self, _codec: CompressionCodec) -> bool {
        true
    }
}

/// Codec backed by `snap`, `lz4_flex` and `zstd`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodec;

impl Codec for DefaultCodec {
    fn compress(&self, codec: CompressionCodec, input: &[u8]) -> Result<Vec<u8>> {
        match codec {
            CompressionCodec::Uncompressed => Ok(input.to_vec()),
            CompressionCodec::Snappy => snap::raw::Encoder::new()
                .compress_vec(input)
                .map_err(|e| ColfileError::encoding(format!("snappy: {}", e))),
            CompressionCodec::Lz4 => Ok(lz4_flex::block::compress(input)),
            CompressionCodec::Zstd => zstd::bulk::compress(input, ZSTD_DEFAULT_LEVEL)
                .map_err(|e| ColfileError::encoding(format!("zstd: {}", e))),
        }
    }

    fn decompress(
        &self,
        codec: CompressionCodec,
        input: &[u8],
        expected_size: usize,
    ) -> Result<Vec<u8>> {
        let output = match codec {
            CompressionCodec::Uncompressed => input.to_vec(),
            CompressionCodec::Snappy => snap::raw::Decoder::new()
                .decompress_vec(input)
                .map_err(|e| ColfileError::corrupt(format!("snappy: {}", e)))?,
            CompressionCodec::Lz4 => lz4_flex::block::decompress(input, expected_size)
                .map_err(|e| ColfileError::corrupt(format!("lz4: {}", e)))?,
            CompressionCodec::Zstd => zstd::bulk::decompress(input, expected_size)
                .map_err(|e| ColfileError::corrupt(format!("zstd: {}", e)))?,
        };
        if output.len() != expected_size {
            return Err(ColfileError::corrupt(format!(
                "{} chunk decompressed to {} bytes, expected {}",
                codec,
                output.len(),
                expected_size
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 17).to_le_bytes()).collect()
    }

    #[test]
    fn test_codecs_roundtrip() {
        let input = sample();
        for codec in [
            CompressionCodec::Uncompressed,
            CompressionCodec::Snappy,
            CompressionCodec::Lz4,
            CompressionCodec::Zstd,
        ] {
            let compressed = DefaultCodec.compress(codec, &input).unwrap();
            if codec != CompressionCodec::Uncompressed {
                assert!(compressed.len() < input.len(), "{} did not compress", codec);
            }
            let output = DefaultCodec.decompress(codec, &compressed, input.len()).unwrap();
            assert_eq!(output, input);
        }
    }

    #[test]
    fn test_decompress_size_mismatch() {
        let input = sample();
        let compressed = DefaultCodec.compress(CompressionCodec::Snappy, &input).unwrap();
        let err = DefaultCodec
            .decompress(CompressionCodec::Snappy, &compressed, input.len() + 1)
            .unwrap_err();
        assert!(matches!(err, ColfileError::CorruptFile(_)));
    }

    #[test]
    fn test_garbage_input_is_corrupt() {
        let err = DefaultCodec
            .decompress(CompressionCodec::Zstd, &[1, 2, 3, 4], 100)
            .unwrap_err();
        assert!(matches!(err, ColfileError::CorruptFile(_)));
    }

    #[test]
    fn test_codec_ids() {
        assert_eq!(CompressionCodec::Zstd.id(), 3);
        assert_eq!(CompressionCodec::from_id(2).unwrap(), CompressionCodec::Lz4);
        assert!(CompressionCodec::from_id(9).is_err());
        assert_eq!("SNAPPY".parse::<CompressionCodec>().unwrap(), CompressionCodec::Snappy);
        assert!("gzip".parse::<CompressionCodec>().is_err());
    }
}
