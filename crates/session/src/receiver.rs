//! Receiver state machine: scanning frames into a reassembly session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use qrferry_transfer::{Ingest, RateMeter, ReceivedFile, RejectReason, TransferSession};

use crate::events::{ReceiverEvent, ReceiverState, ScanStats};
use crate::scheduler::Ticker;
use crate::transport::{ImageDecoder, ImageSource};
use crate::SessionError;

/// Receiver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Delay between polls of the image source.
    pub scan_interval: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
        }
    }
}

/// Drives one incoming transfer.
///
/// `IDLE → INITIALIZING → SCANNING → RECEIVING ⇄ PAUSED → COMPLETED`, with
/// `CANCELLED` and `ERROR` reachable from any non-terminal state. Each
/// [`tick`](Self::tick) polls the image source once; every decoded text
/// goes through [`ingest_text`](Self::ingest_text).
pub struct TransferReceiver<S, D, T> {
    config: ReceiverConfig,
    source: S,
    decoder: D,
    ticker: T,
    state: ReceiverState,
    /// State to return to on resume.
    paused_from: Option<ReceiverState>,
    session: TransferSession,
    rate: RateMeter,
    stats: ScanStats,
    result: Option<Arc<ReceivedFile>>,
    events_tx: mpsc::UnboundedSender<ReceiverEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ReceiverEvent>>,
}

impl<S: ImageSource, D: ImageDecoder, T: Ticker> TransferReceiver<S, D, T> {
    pub fn new(config: ReceiverConfig, source: S, decoder: D, ticker: T) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            source,
            decoder,
            ticker,
            state: ReceiverState::Idle,
            paused_from: None,
            session: TransferSession::new(),
            rate: RateMeter::default(),
            stats: ScanStats::default(),
            result: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ReceiverEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// The verified file once COMPLETED.
    pub fn result(&self) -> Option<Arc<ReceivedFile>> {
        self.result.clone()
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            chunks_per_second: self.rate.per_second(),
            session: Some(self.session.stats()),
            ..self.stats.clone()
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Opens the image source and starts scanning.
    ///
    /// From a terminal state the previous transfer is discarded first.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            self.reset();
        }
        self.require("initialize", &[ReceiverState::Idle])?;
        self.set_state(ReceiverState::Initializing);

        if let Err(e) = self.source.open() {
            return Err(self.fail(e));
        }

        self.set_state(ReceiverState::Scanning);
        self.ticker.start(self.config.scan_interval);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.require("pause", &[ReceiverState::Scanning, ReceiverState::Receiving])?;
        self.ticker.stop();
        self.paused_from = Some(self.state);
        self.set_state(ReceiverState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.require("resume", &[ReceiverState::Paused])?;
        let to = self.paused_from.take().unwrap_or(ReceiverState::Scanning);
        self.set_state(to);
        self.ticker.start(self.config.scan_interval);
        Ok(())
    }

    /// Stops scanning and discards everything received.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.shutdown();
        self.session.reset();
        self.set_state(ReceiverState::Cancelled);
        Ok(())
    }

    /// Returns to IDLE with an empty session, ready for a new transfer.
    pub fn reset(&mut self) {
        self.shutdown();
        self.session.reset();
        self.rate.reset();
        self.stats = ScanStats::default();
        self.result = None;
        self.paused_from = None;
        self.set_state(ReceiverState::Idle);
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Polls the image source once. Ignored unless SCANNING or RECEIVING.
    pub fn tick(&mut self) {
        if !self.is_scanning() {
            return;
        }
        self.stats.scans += 1;

        let image = match self.source.capture() {
            Ok(Some(image)) => image,
            Ok(None) => {
                self.stats.empty_scans += 1;
                return;
            }
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        let Some(text) = self.decoder.decode(&image) else {
            self.stats.empty_scans += 1;
            return;
        };
        self.stats.decoded += 1;

        if let Err(e) = self.ingest_text(&text) {
            debug!(error = %e, "decoded frame not ingested");
        }
    }

    /// Feeds one decoded frame text to the session.
    ///
    /// Envelope-level failures are reported as [`Ingest::Rejected`] and
    /// leave the machine scanning.
    pub fn ingest_text(&mut self, text: &str) -> Result<Ingest, SessionError> {
        if !self.is_scanning() {
            return Err(self.invalid("ingest a frame"));
        }

        let outcome = self.session.add_text(text);
        match &outcome {
            Ingest::NewChunk {
                index,
                received,
                total,
                progress,
            } => {
                self.stats.accepted += 1;
                self.rate.record(1);
                let remaining = u64::from(total.saturating_sub(*received));
                self.emit(ReceiverEvent::ChunkReceived {
                    index: *index,
                    received: *received,
                    total: *total,
                    progress: *progress,
                    eta: self.rate.eta(remaining),
                });
            }
            Ingest::Header { .. } | Ingest::Footer => {
                self.stats.accepted += 1;
            }
            Ingest::Duplicate { .. } => {
                self.stats.duplicates += 1;
            }
            Ingest::Rejected(reason) => {
                self.stats.rejected += 1;
                match reason {
                    RejectReason::CrcMismatch { .. } => self.stats.crc_mismatches += 1,
                    RejectReason::Decode { .. } | RejectReason::VersionMismatch { .. } => {
                        self.stats.malformed += 1
                    }
                    RejectReason::Invalid(_)
                    | RejectReason::TotalMismatch { .. }
                    | RejectReason::FooterMismatch(_) => {}
                }
                self.emit(ReceiverEvent::Rejected {
                    code: reason.code(),
                    message: reason.to_string(),
                });
            }
        }

        if outcome.is_accepted() && self.state == ReceiverState::Scanning {
            self.set_state(ReceiverState::Receiving);
        }

        if outcome.is_new() && self.session.is_complete() {
            self.complete();
        }

        Ok(outcome)
    }

    fn complete(&mut self) {
        self.shutdown();
        match self.session.finish() {
            Ok(file) => {
                info!(
                    file = %file.file_name,
                    size = file.data.len(),
                    "file received"
                );
                let file = Arc::new(file);
                self.result = Some(Arc::clone(&file));
                self.set_state(ReceiverState::Completed);
                self.emit(ReceiverEvent::Complete(file));
            }
            Err(e) => {
                self.fail(e.into());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_scanning(&self) -> bool {
        matches!(
            self.state,
            ReceiverState::Scanning | ReceiverState::Receiving
        )
    }

    fn shutdown(&mut self) {
        self.ticker.stop();
        self.source.close();
    }

    fn require(&self, action: &'static str, allowed: &[ReceiverState]) -> Result<(), SessionError> {
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
        warn!(code = error.code(), error = %error, "receiver failed");
        self.shutdown();
        self.set_state(ReceiverState::Error);
        self.emit(ReceiverEvent::Error {
            code: error.code(),
            message: error.to_string(),
        });
        error
    }

    fn set_state(&mut self, to: ReceiverState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(%from, %to, "receiver state changed");
        self.emit(ReceiverEvent::StateChanged { from, to });
    }

    fn emit(&self, event: ReceiverEvent) {
        let _ = self.events_tx.send(event);
    }
}
