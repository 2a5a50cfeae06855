// src/source.rs
use crate::source_pcap::PcapSource;
use crate::source_snoop::SnoopSource;
use anyhow::Context;
use bytes::BytesMut;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::time::Duration;

const READ_BUFFER: usize = 1 << 16;
/// A whole pcap file header. The pcap parser takes its header from a single
/// read, so the replayed prefix must already hold all of it.
const SNIFF_LEN: usize = 24;

/// One frame as it came out of the capture file.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Capture timestamp, relative to the Unix epoch.
    pub ts: Duration,
    /// Bytes present in `data`.
    pub caplen: usize,
    /// Length on the wire before the capture device truncated it.
    pub origlen: usize,
    pub data: BytesMut,
}

impl CapturedFrame {
    pub fn new(ts: Duration, data: &[u8], origlen: usize) -> Self {
        Self {
            ts,
            caplen: data.len(),
            origlen: origlen.max(data.len()),
            data: BytesMut::from(data),
        }
    }

    #[inline]
    pub fn is_truncated(&self) -> bool { self.caplen < self.origlen }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Pcap,
    Snoop,
}

/// A finite stream of captured frames. `Ok(None)` is end of stream.
pub trait PacketSource {
    fn format(&self) -> CaptureFormat;
    fn next_frame(&mut self) -> anyhow::Result<Option<CapturedFrame>>;
}

/// Opens a capture file (or stdin for "-") and picks a reader by sniffing
/// its first bytes. `Ok(None)` means the format was not recognised.
pub fn open_input(path: &str) -> anyhow::Result<Option<Box<dyn PacketSource>>> {
    if path == "-" {
        return from_reader(BufReader::with_capacity(READ_BUFFER, io::stdin()));
    }
    let f = File::open(path).with_context(|| format!("could not open {}", path))?;
    from_reader(BufReader::with_capacity(READ_BUFFER, f))
}

/// Reads up to `SNIFF_LEN` bytes (a pipe may hand them over a few at a time),
/// picks a reader, then replays the sniffed bytes in front of the rest.
pub fn from_reader<R: Read + 'static>(mut r: R) -> anyhow::Result<Option<Box<dyn PacketSource>>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut r)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .context("read capture header")?;
    let snoop = SnoopSource::<R>::detect(&head);
    let pcap = PcapSource::<R>::detect(&head);
    let stream = Cursor::new(head).chain(r);
    if snoop {
        return Ok(Some(Box::new(SnoopSource::new(stream)?)));
    }
    if pcap {
        return Ok(Some(Box::new(PcapSource::new(stream)?)));
    }
    Ok(None)
}
