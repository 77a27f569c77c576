//! Barcode capacity limits and chunk sizing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Fixed JSON overhead budgeted for a DATA envelope around its payload.
pub const DATA_ENVELOPE_OVERHEAD: usize = 200;

/// QR error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCorrectionLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl ErrorCorrectionLevel {
    /// Byte-mode capacity of the largest symbol (version 40) at this level.
    pub fn max_bytes(self) -> usize {
        match self {
            ErrorCorrectionLevel::L => 2953,
            ErrorCorrectionLevel::M => 2331,
            ErrorCorrectionLevel::Q => 1663,
            ErrorCorrectionLevel::H => 1273,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCorrectionLevel::L => "L",
            ErrorCorrectionLevel::M => "M",
            ErrorCorrectionLevel::Q => "Q",
            ErrorCorrectionLevel::H => "H",
        }
    }
}

impl fmt::Display for ErrorCorrectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCorrectionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(ErrorCorrectionLevel::L),
            "m" | "medium" => Ok(ErrorCorrectionLevel::M),
            "q" | "quartile" => Ok(ErrorCorrectionLevel::Q),
            "h" | "high" => Ok(ErrorCorrectionLevel::H),
            _ => Err(format!("unknown error correction level: {s} (expected L, M, Q or H)")),
        }
    }
}

/// Largest chunk size whose encoded DATA envelope fits at `level`.
///
/// Per-chunk compression is only kept when it shrinks the chunk, so the
/// worst case is the raw chunk: base64 turns every 3 bytes into 4
/// characters, plus [`DATA_ENVELOPE_OVERHEAD`].
pub fn recommended_chunk_size(level: ErrorCorrectionLevel) -> usize {
    let room = level.max_bytes().saturating_sub(DATA_ENVELOPE_OVERHEAD);
    room / 4 * 3
}

/// Checks that every encoded frame fits the capacity of `level`.
pub fn check_capacity<I>(frames: I, level: ErrorCorrectionLevel) -> Result<(), ProtocolError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let max = level.max_bytes();
    for (position, frame) in frames.into_iter().enumerate() {
        let len = frame.as_ref().len();
        if len > max {
            return Err(ProtocolError::FrameTooLarge { position, len, max });
        }
    }
    Ok(())
}
