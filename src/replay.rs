// src/replay.rs
use crate::classify::OutputClassifier;
use crate::config::SessionConfig;
use crate::error::ReplayError;
use crate::metrics;
use crate::repair::PacketRepairer;
use crate::source::PacketSource;
use crate::stats::{StatsRecorder, StatsReport};
use crate::timing::TimingGovernor;
use crate::tx::{LinkWriter, Transmitter};
use crate::util::BarrierFlag;
use log::{debug, info, trace, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The cancellation flag was seen before the next frame was pulled.
    Cancelled,
}

/// Drives every input file through pacing, classification, repair and
/// transmission, `loops` times over.
pub struct ReplayLoop<W: LinkWriter> {
    loops: u32,
    governor: TimingGovernor,
    classifier: OutputClassifier,
    repairer: PacketRepairer,
    tx: Transmitter<W>,
    stats: StatsRecorder,
    cancel: Arc<BarrierFlag>,
}

impl<W: LinkWriter> ReplayLoop<W> {
    pub fn new(cfg: &SessionConfig, tx: Transmitter<W>, cancel: Arc<BarrierFlag>) -> Self {
        Self {
            loops: cfg.loops.max(1),
            governor: TimingGovernor::new(cfg.speed),
            classifier: OutputClassifier::new(cfg),
            repairer: PacketRepairer::new(cfg.repair),
            tx,
            stats: StatsRecorder::start(),
            cancel,
        }
    }

    /// Replays `inputs` in order. `open` yields `Ok(None)` for files in an
    /// unknown format; both that and an open error skip the file.
    pub fn run<F>(&mut self, inputs: &[String], mut open: F) -> Result<Outcome, ReplayError>
    where
        F: FnMut(&str) -> anyhow::Result<Option<Box<dyn PacketSource>>>,
    {
        self.stats = StatsRecorder::start();
        for pass in 0..self.loops {
            for input in inputs {
                let mut src = match open(input) {
                    Ok(Some(src)) => src,
                    Ok(None) => {
                        warn!("{} is not a pcap or snoop file, skipping", input);
                        metrics::inc_input_skipped();
                        continue;
                    }
                    Err(e) => {
                        warn!("{e:#}, skipping");
                        metrics::inc_input_skipped();
                        continue;
                    }
                };
                debug!("pass {}: replaying {} ({:?})", pass + 1, input, src.format());
                self.classifier.reset();
                self.governor.reset();
                if self.replay_file(input, src.as_mut())? == Outcome::Cancelled {
                    info!("interrupted during {}", input);
                    return Ok(Outcome::Cancelled);
                }
            }
        }
        Ok(Outcome::Completed)
    }

    fn replay_file(&mut self, input: &str, src: &mut dyn PacketSource) -> Result<Outcome, ReplayError> {
        loop {
            if self.cancel.is_raised() {
                return Ok(Outcome::Cancelled);
            }
            let mut frame = match src.next_frame() {
                Ok(Some(f)) => f,
                Ok(None) => return Ok(Outcome::Completed),
                Err(e) => {
                    warn!("{}: {e:#}; ending file early", input);
                    return Ok(Outcome::Completed);
                }
            };

            self.governor.pace(frame.ts, frame.caplen);
            let port = self.classifier.classify(&mut frame.data)?;
            if self.repairer.apply(&mut frame) {
                trace!("repaired frame {} -> {} bytes", frame.caplen, frame.data.len());
            }
            self.tx.send(port, &frame.data, frame.caplen, &mut self.stats.counters)?;
        }
    }

    /// Stamps the end time and returns the report. Safe to call after `run`
    /// failed.
    pub fn finish(&mut self) -> StatsReport { self.stats.finish() }
}
