//! Compression codecs for column payloads.
//!
//! Each codec is byte-buffer in, byte-buffer out. `decompress` takes the
//! expected uncompressed length and rejects any mismatch, so a corrupt
//! chunk cannot silently produce short or oversized output.

use std::io::{Read, Write};

use serde::Serialize;

use crate::error::{JparqueError, Result};

const ZSTD_LEVEL: i32 = 3;

/// Stable codec identifiers as stored in file metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompressionCodec {
    Uncompressed,
    Snappy,
    Gzip,
    Lzo,
    Brotli,
    Lz4,
    Zstd,
}

impl CompressionCodec {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(CompressionCodec::Uncompressed),
            1 => Some(CompressionCodec::Snappy),
            2 => Some(CompressionCodec::Gzip),
            3 => Some(CompressionCodec::Lzo),
            4 => Some(CompressionCodec::Brotli),
            5 => Some(CompressionCodec::Lz4),
            6 => Some(CompressionCodec::Zstd),
            _ => None,
        }
    }

    pub fn tag(&self) -> i32 {
        match self {
            CompressionCodec::Uncompressed => 0,
            CompressionCodec::Snappy => 1,
            CompressionCodec::Gzip => 2,
            CompressionCodec::Lzo => 3,
            CompressionCodec::Brotli => 4,
            CompressionCodec::Lz4 => 5,
            CompressionCodec::Zstd => 6,
        }
    }
}

/// Symmetric compressor over byte buffers.
pub trait Compressor {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `input`, validating the result against
    /// `uncompressed_len`.
    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

/// Map a codec tag to its compressor. LZO, Brotli and LZ4 exist in the
/// tag enum but are not implemented and yield a distinct failure.
pub fn create_codec(codec: CompressionCodec) -> Result<Box<dyn Compressor>> {
    match codec {
        CompressionCodec::Uncompressed => Ok(Box::new(PassthroughCodec)),
        CompressionCodec::Snappy => Ok(Box::new(SnappyCodec)),
        CompressionCodec::Gzip => Ok(Box::new(GzipCodec)),
        CompressionCodec::Zstd => Ok(Box::new(ZstdCodec)),
        CompressionCodec::Lzo | CompressionCodec::Brotli | CompressionCodec::Lz4 => {
            Err(JparqueError::UnsupportedCodec(codec))
        }
    }
}

fn check_length(out: Vec<u8>, expected: usize) -> Result<Vec<u8>> {
    if out.len() != expected {
        return Err(JparqueError::SizeMismatch {
            context: "decompressed payload",
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

struct PassthroughCodec;

impl Compressor for PassthroughCodec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        check_length(input.to_vec(), uncompressed_len)
    }
}

struct SnappyCodec;

impl Compressor for SnappyCodec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(input)
            .map_err(|e| JparqueError::Io(std::io::Error::other(e)))
    }

    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = snap::raw::Decoder::new()
            .decompress_vec(input)
            .map_err(|e| JparqueError::Io(std::io::Error::other(e)))?;
        check_length(out, uncompressed_len)
    }
}

struct GzipCodec;

impl Compressor for GzipCodec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(uncompressed_len);
        flate2::read::GzDecoder::new(input).read_to_end(&mut out)?;
        check_length(out, uncompressed_len)
    }
}

struct ZstdCodec;

impl Compressor for ZstdCodec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::bulk::compress(input, ZSTD_LEVEL)?)
    }

    fn decompress(&self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = zstd::bulk::decompress(input, uncompressed_len)?;
        check_length(out, uncompressed_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        // Compressible but not trivial input.
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.extend_from_slice(format!("row-{:06} ", i % 37).as_bytes());
        }
        data
    }

    #[test]
    fn test_round_trip_every_implemented_codec() {
        let data = sample();
        for codec in [
            CompressionCodec::Uncompressed,
            CompressionCodec::Snappy,
            CompressionCodec::Gzip,
            CompressionCodec::Zstd,
        ] {
            let compressor = create_codec(codec).unwrap();
            let compressed = compressor.compress(&data).unwrap();
            let restored = compressor.decompress(&compressed, data.len()).unwrap();
            assert_eq!(restored, data, "codec {:?}", codec);
        }
    }

    #[test]
    fn test_compression_actually_shrinks() {
        let data = sample();
        for codec in [
            CompressionCodec::Snappy,
            CompressionCodec::Gzip,
            CompressionCodec::Zstd,
        ] {
            let compressor = create_codec(codec).unwrap();
            let compressed = compressor.compress(&data).unwrap();
            assert!(compressed.len() < data.len(), "codec {:?}", codec);
        }
    }

    #[test]
    fn test_unsupported_codecs_are_distinct_failures() {
        for codec in [
            CompressionCodec::Lzo,
            CompressionCodec::Brotli,
            CompressionCodec::Lz4,
        ] {
            assert!(matches!(
                create_codec(codec),
                Err(JparqueError::UnsupportedCodec(c)) if c == codec
            ));
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let data = sample();
        for codec in [
            CompressionCodec::Uncompressed,
            CompressionCodec::Snappy,
            CompressionCodec::Gzip,
        ] {
            let compressor = create_codec(codec).unwrap();
            let compressed = compressor.compress(&data).unwrap();
            assert!(matches!(
                compressor.decompress(&compressed, data.len() + 1),
                Err(JparqueError::SizeMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_codec_tags_are_stable() {
        for tag in 0..7 {
            assert_eq!(CompressionCodec::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(CompressionCodec::from_tag(7).is_none());
    }

    #[test]
    fn test_empty_input_round_trip() {
        for codec in [
            CompressionCodec::Uncompressed,
            CompressionCodec::Snappy,
            CompressionCodec::Gzip,
            CompressionCodec::Zstd,
        ] {
            let compressor = create_codec(codec).unwrap();
            let compressed = compressor.compress(&[]).unwrap();
            assert_eq!(compressor.decompress(&compressed, 0).unwrap(), Vec::<u8>::new());
        }
    }
}
