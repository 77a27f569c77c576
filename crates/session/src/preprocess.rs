//! Whole-file preparation before chunking.

use std::path::Path;

use tracing::{debug, warn};

use qrferry_protocol::compression::{self, CompressionStats};
use qrferry_protocol::integrity::sha256_hex;
use qrferry_transfer::FileMeta;

use crate::SessionError;

/// A file loaded for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data,
        }
    }

    /// Reads `path`, naming the file after its last component.
    pub fn from_path(path: &Path) -> Result<Self, SessionError> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let media_type = media_type_for(&name);
        Ok(Self {
            name,
            media_type,
            data,
        })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Best-effort media type from a file extension.
pub fn media_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Payload ready for the packetizer.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Bytes to chunk: the file, or its gzip form when that is smaller.
    pub payload: Vec<u8>,
    pub meta: FileMeta,
    /// Digest of the original file.
    pub original_sha256: String,
    pub stats: CompressionStats,
}

impl Preprocessed {
    pub fn is_compressed(&self) -> bool {
        self.meta.content_encoding.is_some()
    }
}

/// Optionally gzips the whole file, keeping the result only if smaller.
pub fn preprocess(file: &SourceFile, compress_file: bool) -> Preprocessed {
    let original_size = file.data.len();
    let original_sha256 = sha256_hex(&file.data);
    let meta = FileMeta::new(file.name.clone(), file.media_type.clone());

    if compress_file {
        match compression::compress(&file.data) {
            Ok(packed) if packed.len() < original_size => {
                let stats = CompressionStats::new(original_size, packed.len());
                debug!(
                    file = %file.name,
                    original = original_size,
                    compressed = packed.len(),
                    "whole-file compression applied"
                );
                return Preprocessed {
                    payload: packed,
                    meta: meta.gzipped(original_size as u64),
                    original_sha256,
                    stats,
                };
            }
            Ok(packed) => {
                debug!(
                    file = %file.name,
                    original = original_size,
                    compressed = packed.len(),
                    "whole-file compression skipped, no gain"
                );
            }
            Err(e) => warn!(file = %file.name, error = %e, "whole-file compression failed"),
        }
    }

    Preprocessed {
        payload: file.data.clone(),
        meta,
        original_sha256,
        stats: CompressionStats::new(original_size, original_size),
    }
}
