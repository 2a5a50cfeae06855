// src/stats.rs
use std::fmt;
use std::time::{Duration, Instant};

/// Session counters. Only ever increase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub failed_write_retries: u64,
}

#[derive(Debug)]
pub struct StatsRecorder {
    pub counters: SessionStats,
    begin: Instant,
    end: Option<Instant>,
}

impl StatsRecorder {
    /// Marks the session start.
    pub fn start() -> Self {
        Self { counters: SessionStats::default(), begin: Instant::now(), end: None }
    }

    /// Stamps the end time on first call; later calls reuse it.
    pub fn finish(&mut self) -> StatsReport {
        let end = *self.end.get_or_insert_with(Instant::now);
        StatsReport::new(self.counters, end.saturating_duration_since(self.begin))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub counters: SessionStats,
    pub elapsed: Duration,
    pub bytes_per_sec: f64,
    pub megabits_per_sec: f64,
    pub packets_per_sec: f64,
}

impl StatsReport {
    pub fn new(counters: SessionStats, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs() as f64 + elapsed.subsec_micros() as f64 / 1_000_000.0;
        let (bps, pps) = if secs > 0.0 {
            (counters.bytes_sent as f64 / secs, counters.packets_sent as f64 / secs)
        } else {
            (0.0, 0.0)
        };
        Self {
            counters,
            elapsed,
            bytes_per_sec: bps,
            megabits_per_sec: bps * 8.0 / (1024.0 * 1024.0),
            packets_per_sec: pps,
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            " {} packets ({} bytes) sent in {}.{:02} seconds",
            self.counters.packets_sent,
            self.counters.bytes_sent,
            self.elapsed.as_secs(),
            self.elapsed.subsec_millis() / 10,
        )?;
        write!(
            f,
            " {:.1} bytes/sec {:.2} megabits/sec {:.0} packets/sec",
            self.bytes_per_sec, self.megabits_per_sec, self.packets_per_sec,
        )?;
        if self.counters.failed_write_retries > 0 {
            write!(f, "\n {} write attempts failed from full buffers and were repeated", self.counters.failed_write_retries)?;
        }
        Ok(())
    }
}
