use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

struct RateSample {
    count: u64,
    timestamp: Instant,
}

/// Item rate over a sliding window of samples.
///
/// The receiver feeds it one sample per accepted chunk to report
/// chunks/second and an ETA for the rest of the transfer.
pub struct RateMeter {
    samples: VecDeque<RateSample>,
    max_samples: usize,
    window: Duration,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl RateMeter {
    /// Creates a meter.
    ///
    /// - `window`: time span considered (default 5 s).
    /// - `max_samples`: retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
            window: window.unwrap_or(DEFAULT_WINDOW),
        }
    }

    /// Records `count` items at the current instant.
    pub fn record(&mut self, count: u64) {
        self.record_at(count, Instant::now());
    }

    /// Records `count` items at `timestamp`.
    pub fn record_at(&mut self, count: u64, timestamp: Instant) {
        self.samples.push_back(RateSample { count, timestamp });

        if let Some(cutoff) = timestamp.checked_sub(self.window) {
            while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
                self.samples.pop_front();
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Items per second within the window; 0.0 with fewer than 2 samples.
    pub fn per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        // The first sample opens the window; its items were counted before it.
        let counted: u64 = self.samples.iter().skip(1).map(|s| s.count).sum();
        counted as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to process `remaining` items, `None` at zero rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
