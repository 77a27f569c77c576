/// Protocol version embedded in every envelope.
///
/// Receivers reject envelopes carrying any other version string.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default nominal chunk payload size in bytes.
///
/// 1 KiB of raw data becomes roughly 1.4 KB of envelope text after base64
/// and the JSON wrapper, which fits comfortably in a medium error
/// correction symbol.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest file accepted by the sender (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Upper bound on `total` and `totalChunks`.
///
/// A default-size file at the smallest practical chunk size stays well
/// below it.
pub const MAX_TOTAL_CHUNKS: u32 = 1 << 16;

/// Wire name of the header envelope type.
pub const TYPE_FILE_HEADER: &str = "FILE_HEADER";

/// Wire name of the data envelope type.
pub const TYPE_FILE_DATA: &str = "FILE_DATA";

/// Wire name of the footer envelope type.
pub const TYPE_FILE_FOOTER: &str = "FILE_FOOTER";

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Length of a hex-encoded CRC32 checksum.
pub const CRC32_HEX_LEN: usize = 8;
