// src/timing.rs
use crate::config::SpeedMode;
use crate::metrics;
use std::thread;
use std::time::{Duration, Instant};

/// Catch-up pacer. Keeps the running sum of intended gaps since the first
/// frame of the file and only sleeps for however much wall clock time is
/// still owed, so per-frame overhead and oversleeping do not accumulate.
#[derive(Debug)]
pub struct TimingGovernor {
    mode: SpeedMode,
    start: Option<Instant>,
    owed: Duration,
    last_ts: Option<Duration>,
}

impl TimingGovernor {
    pub fn new(mode: SpeedMode) -> Self {
        Self { mode, start: None, owed: Duration::ZERO, last_ts: None }
    }

    /// Called at the start of every input file.
    pub fn reset(&mut self) {
        self.start = None;
        self.owed = Duration::ZERO;
        self.last_ts = None;
    }

    /// Gap this frame asks for relative to the previous one.
    pub fn intended_gap(&self, ts: Duration, len: usize) -> Duration {
        let Some(prev) = self.last_ts else {
            return Duration::ZERO;
        };
        let secs = match self.mode {
            SpeedMode::AsFastAsPossible => return Duration::ZERO,
            SpeedMode::Multiplier(m) => match ts.checked_sub(prev) {
                Some(d) if !d.is_zero() => d.as_secs_f64() / m,
                _ => return Duration::ZERO,
            },
            SpeedMode::FixedRate(bytes_per_sec) => len as f64 / bytes_per_sec,
        };
        Duration::try_from_secs_f64(secs).unwrap_or_default()
    }

    /// How long to sleep before releasing the frame at wall time `now`.
    pub fn plan(&mut self, ts: Duration, len: usize, now: Instant) -> Duration {
        if self.mode == SpeedMode::AsFastAsPossible {
            return Duration::ZERO;
        }
        let gap = self.intended_gap(ts, len);
        self.last_ts = Some(ts);
        let start = *self.start.get_or_insert(now);
        self.owed += gap;
        let elapsed = now.saturating_duration_since(start);
        if elapsed > self.owed {
            metrics::observe_lag((elapsed - self.owed).as_secs_f64());
        }
        self.owed.saturating_sub(elapsed)
    }

    /// Blocks until the frame is due.
    pub fn pace(&mut self, ts: Duration, len: usize) {
        let wait = self.plan(ts, len, Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}
