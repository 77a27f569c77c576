//! Sender state machine: file selection, preparation and frame playback.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use qrferry_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};
use qrferry_protocol::check_capacity;
use qrferry_transfer::{PackageStats, TransferOptions, create_transfer_package, encode_package};

use crate::events::{Frame, PlaybackStats, SenderEvent, SenderState, Stage};
use crate::preprocess::{SourceFile, preprocess};
use crate::scheduler::{Ticker, period_for_fps};
use crate::transport::{FrameRenderer, RenderOptions};
use crate::SessionError;

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;

/// Sender settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub chunk_size: usize,
    pub max_file_size: u64,
    /// Gzip the whole file before chunking when that makes it smaller.
    pub compress_file: bool,
    /// Gzip individual chunks when that makes them smaller. Not applied
    /// on top of whole-file compression.
    pub compress_chunks: bool,
    pub render: RenderOptions,
    pub fps: u32,
    pub loop_playback: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            compress_file: true,
            compress_chunks: true,
            render: RenderOptions::default(),
            fps: 5,
            loop_playback: false,
        }
    }
}

/// Drives one outgoing transfer.
///
/// `IDLE → SELECTING → PREPROCESSING → CHUNKING → GENERATING → PLAYING ⇄
/// PAUSED → COMPLETED`, with `CANCELLED` and `ERROR` reachable from any
/// non-terminal state. Playback advances one frame per [`tick`](Self::tick).
pub struct TransferSender<R, T> {
    config: SenderConfig,
    renderer: R,
    ticker: T,
    state: SenderState,
    file: Option<SourceFile>,
    frames: Vec<Arc<Frame>>,
    total_chunks: u32,
    /// Positions into `frames`, in play order.
    playlist: Vec<usize>,
    cursor: usize,
    played_frames: u64,
    loops: u64,
    events_tx: mpsc::UnboundedSender<SenderEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SenderEvent>>,
}

impl<R: FrameRenderer, T: Ticker> TransferSender<R, T> {
    pub fn new(config: SenderConfig, renderer: R, ticker: T) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            renderer,
            ticker,
            state: SenderState::Idle,
            file: None,
            frames: Vec::new(),
            total_chunks: 0,
            playlist: Vec::new(),
            cursor: 0,
            played_frames: 0,
            loops: 0,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SenderEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn file(&self) -> Option<&SourceFile> {
        self.file.as_ref()
    }

    /// All frames in transmission order.
    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.playlist
            .get(self.cursor)
            .and_then(|&position| self.frames.get(position))
            .cloned()
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            total_frames: self.frames.len(),
            playlist_frames: self.playlist.len(),
            played_frames: self.played_frames,
            loops: self.loops,
            cursor: self.cursor,
        }
    }

    // -----------------------------------------------------------------------
    // Selection and preparation
    // -----------------------------------------------------------------------

    /// Enters SELECTING, discarding any previous transfer.
    pub fn select_file(&mut self) -> Result<(), SessionError> {
        self.require(
            "select a file",
            &[
                SenderState::Idle,
                SenderState::Selecting,
                SenderState::Completed,
                SenderState::Cancelled,
                SenderState::Error,
            ],
        )?;
        self.ticker.stop();
        self.clear();
        self.set_state(SenderState::Selecting);
        Ok(())
    }

    /// Validates and loads `file`.
    pub fn init_transfer(&mut self, file: SourceFile) -> Result<(), SessionError> {
        if self.state != SenderState::Selecting {
            self.select_file()?;
        }

        if let Err(e) = self.validate_file(&file) {
            return Err(self.fail(e));
        }

        info!(file = %file.name, size = file.size(), "file selected");
        self.file = Some(file);
        Ok(())
    }

    fn validate_file(&self, file: &SourceFile) -> Result<(), SessionError> {
        if file.name.trim().is_empty() {
            return Err(SessionError::EmptyFileName);
        }
        if file.size() > self.config.max_file_size {
            return Err(SessionError::FileTooLarge {
                size: file.size(),
                max: self.config.max_file_size,
            });
        }
        Ok(())
    }

    /// Preprocesses, chunks and renders the loaded file.
    ///
    /// Leaves the machine in GENERATING with all frames ready to play.
    pub fn prepare_transfer(&mut self) -> Result<PackageStats, SessionError> {
        self.require("prepare a transfer", &[SenderState::Selecting])?;
        let file = self.file.clone().ok_or(SessionError::NoFile)?;

        match self.build_frames(&file) {
            Ok(stats) => Ok(stats),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn build_frames(&mut self, file: &SourceFile) -> Result<PackageStats, SessionError> {
        self.set_state(SenderState::Preprocessing);
        self.progress(Stage::Preprocess, 0.0, "preprocessing file");
        let pre = preprocess(file, self.config.compress_file);
        info!(
            file = %file.name,
            sha256 = %pre.original_sha256,
            ratio = pre.stats.ratio(),
            saved = pre.stats.saved(),
            compressed = pre.is_compressed(),
            "file preprocessed"
        );
        self.progress(
            Stage::Preprocess,
            25.0,
            format!(
                "payload {} of {} bytes, {:.0}% saved",
                pre.payload.len(),
                pre.stats.original_size,
                pre.stats.saved_percentage()
            ),
        );

        self.set_state(SenderState::Chunking);
        self.progress(Stage::Chunk, 25.0, "splitting into chunks");
        let options = TransferOptions {
            chunk_size: self.config.chunk_size,
            compress_chunks: self.config.compress_chunks && !pre.is_compressed(),
        };
        let envelopes = create_transfer_package(&pre.payload, &pre.meta, &options)?;
        let texts = encode_package(&envelopes)?;
        check_capacity(&texts, self.config.render.error_correction)?;
        self.progress(
            Stage::Chunk,
            50.0,
            format!("{} envelopes", envelopes.len()),
        );

        self.set_state(SenderState::Generating);
        self.progress(Stage::Generate, 50.0, "rendering frames");
        let count = texts.len();
        let mut frames = Vec::with_capacity(count);
        for (position, (envelope, text)) in envelopes.iter().zip(texts).enumerate() {
            let image = self.renderer.render(&text, &self.config.render)?;
            frames.push(Arc::new(Frame {
                position,
                kind: envelope.kind(),
                index: envelope.as_data().map(|c| c.index),
                text,
                image,
            }));
            let percent = 50.0 + (position + 1) as f64 / count as f64 * 25.0;
            self.progress(
                Stage::Generate,
                percent,
                format!("rendered {}/{count}", position + 1),
            );
        }

        let stats = PackageStats::of(
            &envelopes,
            &frames.iter().map(|f| f.text.clone()).collect::<Vec<_>>(),
        );
        self.total_chunks = stats.total_chunks;
        self.frames = frames;
        self.select_all();

        info!(
            file = %file.name,
            frames = self.frames.len(),
            total_chunks = stats.total_chunks,
            largest_frame = stats.largest_frame,
            "frames ready"
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Playback control
    // -----------------------------------------------------------------------

    /// Starts playback. From COMPLETED, replays from the beginning.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require(
            "start playback",
            &[SenderState::Generating, SenderState::Completed],
        )?;
        if self.playlist.is_empty() {
            return Err(SessionError::NoFile);
        }

        self.cursor = 0;
        self.played_frames = 0;
        self.loops = 0;
        self.set_state(SenderState::Playing);
        self.show_current();
        self.ticker.start(period_for_fps(self.config.fps));
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.require("pause", &[SenderState::Playing])?;
        self.ticker.stop();
        self.set_state(SenderState::Paused);
        Ok(())
    }

    /// Resumes from the frame shown when paused.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.require("resume", &[SenderState::Paused])?;
        self.set_state(SenderState::Playing);
        self.show_current();
        self.ticker.start(period_for_fps(self.config.fps));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.ticker.stop();
        self.set_state(SenderState::Cancelled);
        Ok(())
    }

    /// Advances playback by one frame. Ignored unless PLAYING.
    pub fn tick(&mut self) {
        if self.state != SenderState::Playing {
            return;
        }

        self.cursor += 1;
        self.played_frames += 1;

        if self.cursor < self.playlist.len() {
            self.show_current();
            return;
        }

        if self.config.loop_playback {
            self.cursor = 0;
            self.loops += 1;
            debug!(loops = self.loops, "playback looped");
            self.show_current();
        } else {
            self.cursor = self.playlist.len().saturating_sub(1);
            self.ticker.stop();
            self.progress(Stage::Play, 100.0, "playback finished");
            self.set_state(SenderState::Completed);
            self.emit(SenderEvent::Completed);
        }
    }

    /// Jumps to `cursor` within the active playlist and shows that frame.
    pub fn seek(&mut self, cursor: usize) -> Result<(), SessionError> {
        if cursor >= self.playlist.len() {
            return Err(SessionError::InvalidPosition {
                position: cursor,
                len: self.playlist.len(),
            });
        }
        self.cursor = cursor;
        if self.state == SenderState::Playing {
            self.ticker.start(period_for_fps(self.config.fps));
        }
        self.show_current();
        Ok(())
    }

    /// Changes the playback rate, rescheduling the ticker while playing.
    pub fn set_fps(&mut self, fps: u32) -> Result<(), SessionError> {
        if !(MIN_FPS..=MAX_FPS).contains(&fps) {
            return Err(SessionError::InvalidFps(fps));
        }
        self.config.fps = fps;
        if self.state == SenderState::Playing {
            self.ticker.start(period_for_fps(fps));
        }
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.config.loop_playback = enabled;
    }

    /// Restricts playback to the header, the given data chunks and the
    /// footer. Playback restarts from the header.
    pub fn select_chunks(&mut self, indices: &[u32]) -> Result<(), SessionError> {
        if self.frames.is_empty() {
            return Err(SessionError::NoFile);
        }
        if indices.is_empty() {
            return Err(SessionError::InvalidSelection("no chunks selected".into()));
        }
        let selected: BTreeSet<u32> = indices.iter().copied().collect();
        if let Some(&bad) = selected.iter().find(|&&i| i >= self.total_chunks) {
            return Err(SessionError::InvalidSelection(format!(
                "chunk {bad} out of range, transfer has {}",
                self.total_chunks
            )));
        }

        let last = self.frames.len() - 1;
        let mut playlist = Vec::with_capacity(selected.len() + 2);
        playlist.push(0);
        playlist.extend(selected.iter().map(|&i| i as usize + 1));
        playlist.push(last);

        info!(chunks = selected.len(), "playback restricted to selected chunks");
        self.set_playlist(playlist);
        Ok(())
    }

    /// Restores playback of the full sequence.
    pub fn select_all(&mut self) {
        let playlist = (0..self.frames.len()).collect();
        self.set_playlist(playlist);
    }

    fn set_playlist(&mut self, playlist: Vec<usize>) {
        self.playlist = playlist;
        self.cursor = 0;
        if self.state == SenderState::Playing {
            self.ticker.start(period_for_fps(self.config.fps));
            self.show_current();
        }
    }

    /// Releases the file and frames and returns to IDLE.
    pub fn dispose(&mut self) {
        self.ticker.stop();
        self.clear();
        self.set_state(SenderState::Idle);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn clear(&mut self) {
        self.file = None;
        self.frames.clear();
        self.playlist.clear();
        self.total_chunks = 0;
        self.cursor = 0;
        self.played_frames = 0;
        self.loops = 0;
    }

    fn show_current(&mut self) {
        let Some(frame) = self.current_frame() else {
            return;
        };
        let len = self.playlist.len();
        let percent = 75.0 + self.cursor as f64 / len as f64 * 25.0;
        self.emit(SenderEvent::CurrentEnvelope {
            frame,
            cursor: self.cursor,
            playlist_len: len,
        });
        self.progress(
            Stage::Play,
            percent,
            format!("frame {}/{len}", self.cursor + 1),
        );
    }

    fn require(&self, action: &'static str, allowed: &[SenderState]) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            state: self.state.to_string(),
        }
    }

    /// Moves to ERROR and reports `error`, returning it for propagation.
    fn fail(&mut self, error: SessionError) -> SessionError {
        warn!(code = error.code(), error = %error, "sender failed");
        self.ticker.stop();
        self.set_state(SenderState::Error);
        self.emit(SenderEvent::Error {
            code: error.code(),
            message: error.to_string(),
        });
        error
    }

    fn set_state(&mut self, to: SenderState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(%from, %to, "sender state changed");
        self.emit(SenderEvent::StateChanged { from, to });
    }

    fn progress(&self, stage: Stage, percent: f64, message: impl Into<String>) {
        self.emit(SenderEvent::Progress {
            stage,
            percent,
            message: message.into(),
        });
    }

    fn emit(&self, event: SenderEvent) {
        let _ = self.events_tx.send(event);
    }
}
