//! Error types for the envelope codec.

/// Errors produced while encoding, decoding or unpacking envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("unknown envelope type: {0}")]
    UnknownType(String),

    #[error("missing required fields: {}", .0.join(", "))]
    StructuralInvalid(Vec<String>),

    #[error("chunk {index}: cannot extract payload: {reason}")]
    Extract { index: u32, reason: String },

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("frame {position} is {len} bytes, transport capacity is {max}")]
    FrameTooLarge {
        position: usize,
        len: usize,
        max: usize,
    },

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Stable taxonomy code for this error, suitable for events and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "MALFORMED",
            ProtocolError::VersionMismatch { .. } => "VERSION_MISMATCH",
            ProtocolError::UnknownType(_) => "UNKNOWN_TYPE",
            ProtocolError::StructuralInvalid(_) => "STRUCTURAL_INVALID",
            ProtocolError::Extract { .. } => "EXTRACT_ERROR",
            ProtocolError::Compression(_) => "COMPRESSION_ERROR",
            ProtocolError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
            ProtocolError::Encode(_) => "ENCODE_ERROR",
        }
    }
}
