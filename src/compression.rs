//! Chunk compression for chunked containers

use crate::error::{PixelsError, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Compression applied to every chunk of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// Chunks are stored raw
    #[default]
    None,
    /// Raw deflate stream
    Deflate,
    /// Byte run-length encoding
    Rle,
    Zstd,
}

impl CompressionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Rle => "rle",
            CompressionMethod::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionMethod {
    type Err = PixelsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionMethod::None),
            "deflate" | "gzip" => Ok(CompressionMethod::Deflate),
            "rle" => Ok(CompressionMethod::Rle),
            "zstd" => Ok(CompressionMethod::Zstd),
            other => Err(PixelsError::InvalidConfiguration(format!(
                "unknown compression method: {}",
                other
            ))),
        }
    }
}

/// Effort from 0 (store) to 9 (smallest output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Levels above 9 are clamped
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

/// Encodes and decodes chunk payloads
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>>;

    /// Decode a payload. With `expected_size` set, a payload decoding to any
    /// other length is rejected.
    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>>;

    fn method(&self) -> CompressionMethod;
}

fn check_decoded(decoded: Vec<u8>, expected_size: Option<usize>) -> Result<Vec<u8>> {
    match expected_size {
        Some(size) if size != decoded.len() => Err(PixelsError::Decompression(format!(
            "chunk decoded to {} bytes, expected {}",
            decoded.len(),
            size
        ))),
        _ => Ok(decoded),
    }
}

#[derive(Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        check_decoded(data.to_vec(), expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

#[derive(Debug, Default)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let sink = Vec::with_capacity(data.len() / 2);
        let mut encoder = DeflateEncoder::new(sink, FlateCompression::new(u32::from(level.value())));
        encoder
            .write_all(data)
            .map_err(|e| PixelsError::Compression(format!("deflate: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| PixelsError::Compression(format!("deflate: {}", e)))
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let mut decoded = Vec::with_capacity(expected_size.unwrap_or(data.len() * 4));
        DeflateDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(|e| PixelsError::Decompression(format!("deflate: {}", e)))?;
        check_decoded(decoded, expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }
}

#[derive(Debug, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        zstd::bulk::compress(data, i32::from(level.value()))
            .map_err(|e| PixelsError::Compression(format!("zstd: {}", e)))
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        // a bounded decode fails on payloads larger than a chunk
        let decoded = match expected_size {
            Some(size) => zstd::bulk::decompress(data, size),
            None => zstd::decode_all(data),
        }
        .map_err(|e| PixelsError::Decompression(format!("zstd: {}", e)))?;
        check_decoded(decoded, expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

/// `(run length, byte)` pairs, effective on the zero runs of sparse chunks
#[derive(Debug, Default)]
pub struct RleCompressor;

impl Compressor for RleCompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        let mut encoded = Vec::with_capacity(data.len() / 8);
        let mut rest = data;
        while let Some(&value) = rest.first() {
            let run = rest
                .iter()
                .take(u8::MAX as usize)
                .take_while(|&&b| b == value)
                .count();
            encoded.extend_from_slice(&[run as u8, value]);
            rest = &rest[run..];
        }
        Ok(encoded)
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let pairs = data.chunks_exact(2);
        if !pairs.remainder().is_empty() {
            return Err(PixelsError::Decompression(format!(
                "rle payload of {} bytes is not made of pairs",
                data.len()
            )));
        }

        let mut decoded = Vec::with_capacity(expected_size.unwrap_or_default());
        for pair in pairs {
            decoded.resize(decoded.len() + pair[0] as usize, pair[1]);
        }
        check_decoded(decoded, expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Rle
    }
}

/// Codec for a dataset's compression method
pub fn get_compressor(method: CompressionMethod) -> Box<dyn Compressor> {
    match method {
        CompressionMethod::None => Box::new(NoneCompressor),
        CompressionMethod::Deflate => Box::new(DeflateCompressor),
        CompressionMethod::Rle => Box::new(RleCompressor),
        CompressionMethod::Zstd => Box::new(ZstdCompressor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse_plane() -> Vec<u8> {
        let mut plane = vec![0u8; 4096];
        plane[100..140].copy_from_slice(&[7u8; 40]);
        plane
    }

    #[test]
    fn test_compressors_shrink_sparse_chunks() {
        let plane = sparse_plane();
        for method in [
            CompressionMethod::Deflate,
            CompressionMethod::Rle,
            CompressionMethod::Zstd,
        ] {
            let compressor = get_compressor(method);
            assert_eq!(compressor.method(), method);
            let compressed = compressor.compress(&plane, CompressionLevel::default()).unwrap();
            assert!(compressed.len() < plane.len(), "{} did not compress", method);
            let decompressed = compressor
                .decompress(&compressed, Some(plane.len()))
                .unwrap();
            assert_eq!(decompressed, plane);
        }
    }

    #[test]
    fn test_expected_size_is_enforced() {
        let compressor = NoneCompressor;
        assert!(matches!(
            compressor.decompress(&[1, 2, 3], Some(4)),
            Err(PixelsError::Decompression(_))
        ));
        let zstd = ZstdCompressor;
        let compressed = zstd.compress(&sparse_plane(), CompressionLevel::fast()).unwrap();
        assert!(zstd.decompress(&compressed, Some(1024)).is_err());
    }

    #[test]
    fn test_rle_runs() {
        let encoded = RleCompressor
            .compress(&[0u8; 300], CompressionLevel::default())
            .unwrap();
        assert_eq!(encoded, vec![255, 0, 45, 0]);
        assert!(RleCompressor.decompress(&[3], None).is_err());
        assert!(RleCompressor.compress(&[], CompressionLevel::default()).unwrap().is_empty());
    }

    #[test]
    fn test_method_names() {
        assert_eq!("ZSTD".parse::<CompressionMethod>().unwrap(), CompressionMethod::Zstd);
        assert_eq!("gzip".parse::<CompressionMethod>().unwrap(), CompressionMethod::Deflate);
        assert!("lzw".parse::<CompressionMethod>().is_err());
        assert_eq!(
            serde_json::to_string(&CompressionMethod::Deflate).unwrap(),
            "\"deflate\""
        );
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(CompressionLevel::new(42).value(), 9);
        assert_eq!(CompressionLevel::fast().value(), 1);
    }
}
