//! Checksum helpers: CRC32 for chunks, SHA-256 for whole files.

use crc32fast::Hasher;
use sha2::{Digest, Sha256};

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes CRC32 of `data` as 8 lowercase hex digits.
pub fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32(data))
}

/// Checks `data` against a hex CRC32, ignoring case.
pub fn verify_crc32(data: &[u8], expected: &str) -> bool {
    crc32_hex(data).eq_ignore_ascii_case(expected)
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Checks `data` against a hex SHA-256 digest, ignoring case.
pub fn verify_sha256(data: &[u8], expected: &str) -> bool {
    sha256_hex(data).eq_ignore_ascii_case(expected)
}

/// Both checksums of a byte sequence plus its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub crc32: String,
    pub sha256: String,
    pub size: u64,
}

impl Fingerprint {
    pub fn of(data: &[u8]) -> Self {
        Self {
            crc32: crc32_hex(data),
            sha256: sha256_hex(data),
            size: data.len() as u64,
        }
    }
}

pub(crate) fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}
