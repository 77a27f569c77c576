//! Sender and receiver state machines for qrferry transfers.
//!
//! The sender turns a file into a playlist of rendered frames and steps
//! through it on a timer. The receiver polls an image source, decodes
//! frames and feeds them to a reassembly session until the file verifies.

mod error;
pub mod events;
pub mod preprocess;
pub mod receiver;
pub mod scheduler;
pub mod sender;
pub mod transport;

pub use error::SessionError;
pub use events::{
    Frame, PlaybackStats, ReceiverEvent, ReceiverState, ScanStats, SenderEvent, SenderState, Stage,
};
pub use preprocess::{Preprocessed, SourceFile, media_type_for, preprocess};
pub use receiver::{ReceiverConfig, TransferReceiver};
pub use scheduler::{IntervalTicker, ManualTicker, Tick, Ticker, Ticks, period_for_fps};
pub use sender::{MAX_FPS, MIN_FPS, SenderConfig, TransferSender};
pub use transport::{
    FrameRenderer, ImageDecoder, ImageSource, PassthroughCodec, QueuedSource, RenderOptions,
};
