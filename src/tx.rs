// src/tx.rs
use crate::classify::Port;
use crate::error::ReplayError;
use crate::metrics;
use crate::stats::SessionStats;
use log::debug;
use std::io;

/// Something a whole Ethernet frame can be written to.
pub trait LinkWriter {
    fn name(&self) -> &str;
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Output queue full; the kernel will drain it shortly.
#[inline]
pub fn is_transient(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENOBUFS)
}

pub struct Transmitter<W: LinkWriter> {
    primary: W,
    secondary: Option<W>,
}

impl<W: LinkWriter> Transmitter<W> {
    pub fn new(primary: W, secondary: Option<W>) -> Self { Self { primary, secondary } }

    /// Sends one frame, retrying for as long as the output queue is full.
    /// `caplen` is what gets counted, not the possibly repaired length.
    pub fn send(
        &mut self,
        port: Port,
        frame: &[u8],
        caplen: usize,
        stats: &mut SessionStats,
    ) -> Result<(), ReplayError> {
        let link = match (port, self.secondary.as_mut()) {
            (Port::Secondary, Some(w)) => w,
            _ => &mut self.primary,
        };
        loop {
            match link.write_frame(frame) {
                Ok(()) => break,
                Err(e) if is_transient(&e) => {
                    stats.failed_write_retries += 1;
                    metrics::inc_tx_retry();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => {
                    debug!("write of {} bytes on {} failed: {source}", frame.len(), link.name());
                    return Err(ReplayError::Transmit { iface: link.name().to_string(), source });
                }
            }
        }
        stats.packets_sent += 1;
        stats.bytes_sent += caplen as u64;
        metrics::inc_tx(port.as_str(), caplen);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    pub type Sent = Rc<RefCell<Vec<Vec<u8>>>>;

    /// Records every frame; fails according to a scripted queue first.
    pub struct FakeLink {
        pub name: String,
        pub sent: Sent,
        pub script: VecDeque<io::Error>,
        pub attempts: usize,
    }

    impl FakeLink {
        pub fn new(name: &str) -> (Self, Sent) {
            let sent: Sent = Rc::default();
            let link = Self { name: name.into(), sent: sent.clone(), script: VecDeque::new(), attempts: 0 };
            (link, sent)
        }
    }

    impl LinkWriter for FakeLink {
        fn name(&self) -> &str { &self.name }

        fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            self.attempts += 1;
            if let Some(e) = self.script.pop_front() {
                return Err(e);
            }
            self.sent.borrow_mut().push(frame.to_vec());
            Ok(())
        }
    }

    pub fn enobufs() -> io::Error { io::Error::from_raw_os_error(libc::ENOBUFS) }
}
