//! Periodic tick sources driving playback and scanning.
//!
//! State machines never own a timer. They expose a `tick()` method and
//! tell a [`Ticker`] when to start and stop; the host delivers ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::SessionError;

/// A start/stop periodic timer.
pub trait Ticker: Send {
    /// Starts ticking every `period`, replacing any running schedule.
    fn start(&mut self, period: Duration);
    /// Stops ticking. Takes effect immediately.
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

// ---------------------------------------------------------------------------
// ManualTicker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ManualState {
    running: bool,
    period: Option<Duration>,
    starts: u32,
    stops: u32,
}

/// Ticker that never fires on its own.
///
/// Clones share state, so a test keeps one clone to observe what the
/// machine asked for and calls the machine's `tick()` itself.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut ManualState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Period of the current (or last) schedule.
    pub fn period(&self) -> Option<Duration> {
        self.with(|s| s.period)
    }

    pub fn starts(&self) -> u32 {
        self.with(|s| s.starts)
    }

    pub fn stops(&self) -> u32 {
        self.with(|s| s.stops)
    }
}

impl Ticker for ManualTicker {
    fn start(&mut self, period: Duration) {
        self.with(|s| {
            s.running = true;
            s.period = Some(period);
            s.starts += 1;
        });
    }

    fn stop(&mut self) {
        self.with(|s| {
            if s.running {
                s.stops += 1;
            }
            s.running = false;
        });
    }

    fn is_running(&self) -> bool {
        self.with(|s| s.running)
    }
}

// ---------------------------------------------------------------------------
// IntervalTicker
// ---------------------------------------------------------------------------

/// One timer firing, tagged with the schedule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    generation: u64,
}

/// Receiving end of an [`IntervalTicker`].
///
/// Ticks queued by a schedule that has since been stopped or replaced are
/// discarded, so the first tick after a restart is always a fresh one.
pub struct Ticks {
    rx: mpsc::UnboundedReceiver<Tick>,
    generation: Arc<AtomicU64>,
}

impl Ticks {
    /// Waits for the next current tick. `None` once the ticker is dropped.
    pub async fn recv(&mut self) -> Option<Tick> {
        loop {
            let tick = self.rx.recv().await?;
            if self.is_current(tick) {
                return Some(tick);
            }
        }
    }

    /// Returns a current tick if one is already queued.
    pub fn try_recv(&mut self) -> Option<Tick> {
        while let Ok(tick) = self.rx.try_recv() {
            if self.is_current(tick) {
                return Some(tick);
            }
        }
        None
    }

    fn is_current(&self, tick: Tick) -> bool {
        tick.generation == self.generation.load(Ordering::Acquire)
    }
}

/// Tokio-backed ticker delivering [`Tick`]s to a [`Ticks`] receiver.
///
/// The first tick fires one period after `start`. Missed ticks are
/// skipped, so a slow consumer never sees a burst.
pub struct IntervalTicker {
    handle: tokio::runtime::Handle,
    ticks: mpsc::UnboundedSender<Tick>,
    generation: Arc<AtomicU64>,
    stop: Option<oneshot::Sender<()>>,
}

impl IntervalTicker {
    /// Creates a ticker bound to the current tokio runtime, and the
    /// receiving end of its tick channel.
    pub fn channel() -> Result<(Self, Ticks), SessionError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let ticker = Self {
            handle,
            ticks: tx,
            generation: Arc::clone(&generation),
            stop: None,
        };
        Ok((ticker, Ticks { rx, generation }))
    }
}

impl Ticker for IntervalTicker {
    fn start(&mut self, period: Duration) {
        // Dropping the previous sender ends the previous task.
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let ticks = self.ticks.clone();
        let first = tokio::time::Instant::now() + period;
        self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if ticks.send(Tick { generation }).is_err() {
                            break;
                        }
                    }
                    _ = &mut stop_rx => {
                        break;
                    }
                }
            }
        });
    }

    fn stop(&mut self) {
        if self.stop.take().is_some() {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn is_running(&self) -> bool {
        self.stop.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tick period for a frames-per-second rate (`fps` is at least 1).
pub fn period_for_fps(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_ticker_records_requests() {
        let mut ticker = ManualTicker::new();
        let observer = ticker.clone();
        assert!(!observer.is_running());

        ticker.start(Duration::from_millis(200));
        assert!(observer.is_running());
        assert_eq!(observer.period(), Some(Duration::from_millis(200)));

        ticker.stop();
        ticker.stop();
        assert!(!observer.is_running());
        assert_eq!(observer.starts(), 1);
        assert_eq!(observer.stops(), 1);
    }

    #[test]
    fn fps_to_period() {
        assert_eq!(period_for_fps(5), Duration::from_millis(200));
        assert_eq!(period_for_fps(1), Duration::from_secs(1));
        assert_eq!(period_for_fps(0), Duration::from_secs(1));
    }

    #[test]
    fn interval_ticker_needs_runtime() {
        assert!(matches!(
            IntervalTicker::channel(),
            Err(SessionError::NoRuntime)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticker_first_tick_after_one_period() {
        let (mut ticker, mut rx) = IntervalTicker::channel().unwrap();
        ticker.start(Duration::from_millis(100));
        assert!(ticker.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticker_stops() {
        let (mut ticker, mut rx) = IntervalTicker::channel().unwrap();
        ticker.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;

        let mut seen = 0;
        while rx.try_recv().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);

        ticker.stop();
        assert!(!ticker.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_discards_queued_ticks() {
        let (mut ticker, mut rx) = IntervalTicker::channel().unwrap();
        ticker.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;

        // Two ticks are queued and never consumed.
        ticker.stop();
        ticker.start(Duration::from_millis(100));
        assert!(rx.try_recv().is_none());

        let started = tokio::time::Instant::now();
        assert!(rx.recv().await.is_some());
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn recv_ends_when_ticker_dropped() {
        let (ticker, mut rx) = IntervalTicker::channel().unwrap();
        drop(ticker);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_schedule() {
        let (mut ticker, mut rx) = IntervalTicker::channel().unwrap();
        ticker.start(Duration::from_millis(100));
        ticker.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(rx.try_recv().is_none());
    }
}
