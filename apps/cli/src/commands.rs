//! Command implementations.
//!
//! Frames travel as text, one envelope per line. The passthrough codec
//! stands in for barcode rendering and camera decoding, so a frames file
//! is exactly what a screen would show.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde_json::json;
use tracing::info;

use qrferry_session::{
    IntervalTicker, ManualTicker, PassthroughCodec, QueuedSource, ReceiverEvent, ReceiverState,
    SenderState, SourceFile, Ticker, TransferReceiver, TransferSender,
};
use qrferry_transfer::{Ingest, PackageStats, TransferSession, sanitize_file_name};

use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

fn prepared<T: Ticker>(
    config: &AppConfig,
    path: &Path,
    ticker: T,
) -> anyhow::Result<(TransferSender<PassthroughCodec, T>, PackageStats)> {
    let file = SourceFile::from_path(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut sender = TransferSender::new(config.sender_config(), PassthroughCodec, ticker);
    sender.init_transfer(file)?;
    let stats = sender.prepare_transfer()?;
    Ok((sender, stats))
}

/// Writes every envelope of `path`, one per line.
pub fn pack(config: &AppConfig, path: &Path, out: &mut impl Write) -> anyhow::Result<PackageStats> {
    let (sender, stats) = prepared(config, path, ManualTicker::new())?;
    for frame in sender.frames() {
        writeln!(out, "{}", frame.text)?;
    }
    out.flush()?;

    info!(
        frames = sender.frames().len(),
        chunks = stats.total_chunks,
        largest_frame = stats.largest_frame,
        "package written"
    );
    Ok(stats)
}

/// Plays `path` frame by frame at the configured rate.
///
/// Returns the number of frames written. Stops when playback completes or
/// `shutdown` resolves, whichever is first.
pub async fn send(
    config: &AppConfig,
    path: &Path,
    out: &mut impl Write,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<u64> {
    let (ticker, mut ticks) = IntervalTicker::channel()?;
    let (mut sender, _) = prepared(config, path, ticker)?;
    tokio::pin!(shutdown);

    sender.start()?;
    let mut written = 0u64;
    while let Some(frame) = sender.current_frame() {
        writeln!(out, "{}", frame.text)?;
        out.flush()?;
        written += 1;

        tokio::select! {
            tick = ticks.recv() => {
                if tick.is_none() {
                    break;
                }
                sender.tick();
                if sender.state() != SenderState::Playing {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("playback interrupted");
                sender.cancel()?;
                break;
            }
        }
    }

    info!(frames = written, loops = sender.stats().loops, "playback ended");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Receiving
// ---------------------------------------------------------------------------

/// Reads frame lines from `path`, or stdin for `-`.
pub fn read_frames(path: &Path) -> anyhow::Result<Vec<String>> {
    if path == Path::new("-") {
        let stdin = std::io::stdin();
        return Ok(stdin.lock().lines().collect::<Result<_, _>>()?);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Feeds `frames` through the receiver and saves the verified file in
/// `out_dir`. Returns the written path.
pub fn receive(config: &AppConfig, frames: Vec<String>, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let mut receiver = TransferReceiver::new(
        config.receiver_config(),
        QueuedSource::from_frames(frames),
        PassthroughCodec,
        ManualTicker::new(),
    );
    let mut events = receiver.take_events().context("receiver events already taken")?;
    receiver.initialize()?;

    while receiver.source().remaining() > 0
        && matches!(
            receiver.state(),
            ReceiverState::Scanning | ReceiverState::Receiving
        )
    {
        receiver.tick();
    }

    let mut failure = None;
    while let Ok(event) = events.try_recv() {
        if let ReceiverEvent::Error { code, message } = event {
            failure = Some(format!("{code}: {message}"));
        }
    }

    let Some(file) = receiver.result() else {
        if let Some(failure) = failure {
            bail!("transfer failed: {failure}");
        }
        // Reports which parts are still missing.
        receiver.session().reconstruct()?;
        bail!("transfer did not complete");
    };

    let name = sanitize_file_name(&file.file_name)?;
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(name);
    std::fs::write(&path, &file.data)
        .with_context(|| format!("failed to write {}", path.display()))?;

    let stats = receiver.stats();
    info!(
        path = %path.display(),
        size = file.data.len(),
        scans = stats.scans,
        duplicates = stats.duplicates,
        rejected = stats.rejected,
        "file saved"
    );
    Ok(path)
}

/// Decodes every frame line and summarizes what a receiver would hold.
pub fn inspect(frames: &[String]) -> serde_json::Value {
    let mut session = TransferSession::new();
    let mut duplicates = 0u64;
    let mut rejected: BTreeMap<&'static str, u64> = BTreeMap::new();

    for line in frames.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        match session.add_text(line) {
            Ingest::Duplicate { .. } => duplicates += 1,
            Ingest::Rejected(reason) => *rejected.entry(reason.code()).or_default() += 1,
            Ingest::Header { .. } | Ingest::Footer | Ingest::NewChunk { .. } => {}
        }
    }

    let verification = if session.is_complete() {
        match session.finish() {
            Ok(_) => "ok".to_string(),
            Err(e) => e.code().to_string(),
        }
    } else {
        "incomplete".to_string()
    };

    json!({
        "file": session.file_info(),
        "stats": session.stats(),
        "missing": session.missing_indices(),
        "duplicates": duplicates,
        "rejected": rejected,
        "verification": verification,
    })
}
