//! Wire protocol for qrferry optical transfers.
//!
//! A transfer is a sequence of self-describing text envelopes: one
//! `FILE_HEADER`, `total_chunks` `FILE_DATA` chunks and one `FILE_FOOTER`.
//! Each envelope is a single JSON object small enough to fit in one
//! 2-D barcode frame.

pub mod capacity;
pub mod codec;
pub mod compression;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod integrity;

// Re-export primary types for convenience.
pub use capacity::{ErrorCorrectionLevel, check_capacity, recommended_chunk_size};
pub use codec::{
    Validation, check_version, decode_envelope, decode_payload, encode_envelope, encode_payload,
    extract_chunk_bytes, validate_envelope, verify_data_crc,
};
pub use constants::{MAX_TOTAL_CHUNKS, PROTOCOL_VERSION};
pub use envelope::{
    ContentEncoding, DataChunk, Envelope, EnvelopeBody, EnvelopeKind, FileFooter, FileHeader,
    FileInfo, TransferSummary,
};
pub use error::ProtocolError;
