//! Chunked optical transfer: splitting a payload into envelopes and
//! reassembling it from an unordered, lossy stream of envelopes.

mod packetizer;
mod progress;
mod session;
mod validation;

pub use packetizer::{
    FileMeta, PackageStats, TransferOptions, chunk_count, create_transfer_package, encode_package,
};
pub use progress::RateMeter;
pub use session::{Ingest, ReceivedFile, RejectReason, SessionStats, TransferSession};
pub use validation::sanitize_file_name;

use qrferry_protocol::ProtocolError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("{chunks} chunks exceed the protocol limit")]
    TooManyChunks { chunks: usize },

    #[error("transfer incomplete: {missing} chunk(s) missing, header {header}, footer {footer}")]
    Incomplete {
        missing: usize,
        header: bool,
        footer: bool,
    },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),
}

impl TransferError {
    /// Stable taxonomy code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Protocol(e) => e.code(),
            TransferError::InvalidChunkSize | TransferError::TooManyChunks { .. } => {
                "INVALID_CHUNK_SIZE"
            }
            TransferError::Incomplete { .. } => "INCOMPLETE",
            TransferError::SizeMismatch { .. } => "SIZE_MISMATCH",
            TransferError::DigestMismatch { .. } => "DIGEST_MISMATCH",
            TransferError::InvalidFileName(_) => "INVALID_FILE_NAME",
        }
    }
}
