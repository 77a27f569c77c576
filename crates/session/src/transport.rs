//! Image transport seams.
//!
//! Barcode rendering, camera capture and image decoding live outside this
//! crate. The only contract is that text handed to a [`FrameRenderer`]
//! comes back unchanged from an [`ImageDecoder`].

use std::collections::VecDeque;

use qrferry_protocol::ErrorCorrectionLevel;

use crate::SessionError;

/// Rendering parameters for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Edge length of the rendered symbol in pixels.
    pub size: u32,
    pub error_correction: ErrorCorrectionLevel,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            size: 400,
            error_correction: ErrorCorrectionLevel::default(),
        }
    }
}

/// Turns envelope text into a displayable image.
pub trait FrameRenderer {
    fn render(&self, text: &str, options: &RenderOptions) -> Result<Vec<u8>, SessionError>;
}

/// Produces captured images, one per poll.
pub trait ImageSource {
    /// Acquires the device. Called once before scanning starts.
    fn open(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Returns the next image, or `None` when nothing was captured.
    fn capture(&mut self) -> Result<Option<Vec<u8>>, SessionError>;

    /// Releases the device.
    fn close(&mut self) {}
}

/// Extracts envelope text from a captured image.
pub trait ImageDecoder {
    /// Returns `None` when no symbol could be read.
    fn decode(&self, image: &[u8]) -> Option<String>;
}

/// Renderer and decoder that pass the text bytes through untouched.
///
/// Stands in for a real barcode stack in the CLI and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl FrameRenderer for PassthroughCodec {
    fn render(&self, text: &str, _options: &RenderOptions) -> Result<Vec<u8>, SessionError> {
        Ok(text.as_bytes().to_vec())
    }
}

impl ImageDecoder for PassthroughCodec {
    fn decode(&self, image: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(image).ok()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Image source replaying a fixed queue of captures.
///
/// `None` entries model polls where the camera saw nothing.
#[derive(Debug, Default)]
pub struct QueuedSource {
    captures: VecDeque<Option<Vec<u8>>>,
    open: bool,
}

impl QueuedSource {
    pub fn new<I>(captures: I) -> Self
    where
        I: IntoIterator<Item = Option<Vec<u8>>>,
    {
        Self {
            captures: captures.into_iter().collect(),
            open: false,
        }
    }

    /// Source yielding each frame text once, in order.
    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(frames.into_iter().map(|f| Some(f.into().into_bytes())))
    }

    pub fn push(&mut self, capture: Option<Vec<u8>>) {
        self.captures.push_back(capture);
    }

    pub fn remaining(&self) -> usize {
        self.captures.len()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl ImageSource for QueuedSource {
    fn open(&mut self) -> Result<(), SessionError> {
        self.open = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        if !self.open {
            return Err(SessionError::Source("source is not open".into()));
        }
        Ok(self.captures.pop_front().flatten())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
