//! Session error types.

use qrferry_protocol::ProtocolError;
use qrferry_transfer::TransferError;

/// Errors produced by the sender and receiver state machines.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("no file selected")]
    NoFile,

    #[error("file name is empty")]
    EmptyFileName,

    #[error("file is {size} bytes, limit is {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("fps must be between 1 and 60, got {0}")]
    InvalidFps(u32),

    #[error("invalid position {position}, sequence has {len} frames")]
    InvalidPosition { position: usize, len: usize },

    #[error("invalid chunk selection: {0}")]
    InvalidSelection(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("image source error: {0}")]
    Source(String),

    #[error("no tokio runtime available for the ticker")]
    NoRuntime,
}

impl SessionError {
    /// Stable taxonomy code, passing through protocol and transfer codes.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Io(_) => "IO_ERROR",
            SessionError::Protocol(e) => e.code(),
            SessionError::Transfer(e) => e.code(),
            SessionError::InvalidState { .. } => "INVALID_STATE",
            SessionError::NoFile => "NO_FILE",
            SessionError::EmptyFileName => "INVALID_FILE_NAME",
            SessionError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            SessionError::InvalidFps(_) => "INVALID_SPEED",
            SessionError::InvalidPosition { .. } => "INVALID_INDEX",
            SessionError::InvalidSelection(_) => "INVALID_SELECTION",
            SessionError::Render(_) => "RENDER_ERROR",
            SessionError::Source(_) => "SOURCE_ERROR",
            SessionError::NoRuntime => "NO_RUNTIME",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_pass_through_layers() {
        let err = SessionError::from(TransferError::DigestMismatch {
            expected: "a".into(),
            actual: "b".into(),
        });
        assert_eq!(err.code(), "DIGEST_MISMATCH");

        let err = SessionError::from(ProtocolError::FrameTooLarge {
            position: 0,
            len: 3000,
            max: 2331,
        });
        assert_eq!(err.code(), "FRAME_TOO_LARGE");
    }

    #[test]
    fn invalid_state_message() {
        let err = SessionError::InvalidState {
            action: "pause",
            state: "IDLE".into(),
        };
        assert_eq!(err.to_string(), "cannot pause while IDLE");
        assert_eq!(err.code(), "INVALID_STATE");
    }
}
