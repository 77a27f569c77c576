//! Gzip compression used for whole files and individual chunks.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::ProtocolError;

/// Default gzip level (0-9).
pub const DEFAULT_LEVEL: u32 = 6;

/// Gzip-compresses `data` at [`DEFAULT_LEVEL`].
pub fn compress(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    compress_with_level(data, DEFAULT_LEVEL)
}

/// Gzip-compresses `data` at `level` (clamped to 9).
pub fn compress_with_level(data: &[u8], level: u32) -> Result<Vec<u8>, ProtocolError> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 32),
        Compression::new(level.min(9)),
    );
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a gzip stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Returns `true` if `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Size comparison between an input and its compressed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    pub original_size: usize,
    pub compressed_size: usize,
}

impl CompressionStats {
    pub fn new(original_size: usize, compressed_size: usize) -> Self {
        Self {
            original_size,
            compressed_size,
        }
    }

    /// Compressed size divided by original size (0.0 for empty input).
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }

    /// Bytes saved; negative when compression expanded the input.
    pub fn saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }

    /// Percentage of the original size saved.
    pub fn saved_percentage(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.saved() as f64 / self.original_size as f64 * 100.0
    }

    /// Whether the compressed form is strictly smaller.
    pub fn is_beneficial(&self) -> bool {
        self.compressed_size < self.original_size
    }
}
