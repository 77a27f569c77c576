//! States and events of the sender and receiver machines.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use qrferry_protocol::EnvelopeKind;
use qrferry_transfer::{ReceivedFile, SessionStats};

/// Sender lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderState {
    Idle,
    Selecting,
    Preprocessing,
    Chunking,
    Generating,
    Playing,
    Paused,
    Completed,
    Cancelled,
    Error,
}

impl SenderState {
    pub fn as_str(self) -> &'static str {
        match self {
            SenderState::Idle => "IDLE",
            SenderState::Selecting => "SELECTING",
            SenderState::Preprocessing => "PREPROCESSING",
            SenderState::Chunking => "CHUNKING",
            SenderState::Generating => "GENERATING",
            SenderState::Playing => "PLAYING",
            SenderState::Paused => "PAUSED",
            SenderState::Completed => "COMPLETED",
            SenderState::Cancelled => "CANCELLED",
            SenderState::Error => "ERROR",
        }
    }

    /// States with no further automatic transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SenderState::Completed | SenderState::Cancelled | SenderState::Error
        )
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiverState {
    Idle,
    Initializing,
    Scanning,
    Receiving,
    Paused,
    Completed,
    Cancelled,
    Error,
}

impl ReceiverState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiverState::Idle => "IDLE",
            ReceiverState::Initializing => "INITIALIZING",
            ReceiverState::Scanning => "SCANNING",
            ReceiverState::Receiving => "RECEIVING",
            ReceiverState::Paused => "PAUSED",
            ReceiverState::Completed => "COMPLETED",
            ReceiverState::Cancelled => "CANCELLED",
            ReceiverState::Error => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReceiverState::Completed | ReceiverState::Cancelled | ReceiverState::Error
        )
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of sender preparation and playback reported with progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preprocess,
    Chunk,
    Generate,
    Play,
}

/// One envelope ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the full envelope sequence.
    pub position: usize,
    pub kind: EnvelopeKind,
    /// Chunk index for data frames.
    pub index: Option<u32>,
    pub text: String,
    /// Rendered image handed to the display.
    pub image: Vec<u8>,
}

/// Event emitted by the sender.
#[derive(Debug, Clone)]
pub enum SenderEvent {
    StateChanged {
        from: SenderState,
        to: SenderState,
    },
    Progress {
        stage: Stage,
        /// Overall percentage, `0.0..=100.0`.
        percent: f64,
        message: String,
    },
    /// The frame now on screen.
    CurrentEnvelope {
        frame: Arc<Frame>,
        /// Position within the active playlist.
        cursor: usize,
        playlist_len: usize,
    },
    Completed,
    Error {
        code: &'static str,
        message: String,
    },
}

/// Event emitted by the receiver.
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    StateChanged {
        from: ReceiverState,
        to: ReceiverState,
    },
    ChunkReceived {
        index: u32,
        received: u32,
        total: u32,
        /// Fraction received, `0.0..=1.0`.
        progress: f64,
        /// Estimated time for the remaining chunks at the current rate.
        eta: Option<Duration>,
    },
    /// An envelope was dropped; the transfer continues.
    Rejected {
        code: &'static str,
        message: String,
    },
    Complete(Arc<ReceivedFile>),
    Error {
        code: &'static str,
        message: String,
    },
}

/// Playback counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStats {
    /// Frames in the full sequence.
    pub total_frames: usize,
    /// Frames in the active playlist.
    pub playlist_frames: usize,
    pub played_frames: u64,
    pub loops: u64,
    pub cursor: usize,
}

/// Scan counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub scans: u64,
    pub empty_scans: u64,
    pub decoded: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub crc_mismatches: u64,
    pub malformed: u64,
    pub chunks_per_second: f64,
    pub session: Option<SessionStats>,
}
