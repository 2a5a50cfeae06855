// src/source_pcap.rs
use crate::source::{CaptureFormat, CapturedFrame, PacketSource};
use log::warn;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use std::io::Read;
use std::time::Duration;

/// Parser buffer; must hold the largest record (snaplen 262144 is common).
const PARSER_BUFFER: usize = 1 << 20;

/// Consecutive refills that produce no complete block before the file is
/// declared truncated.
const MAX_STALLS: u32 = 64;

const MAGICS: [u32; 4] = [0xA1B2_C3D4, 0xA1B2_3C4D, 0xD4C3_B2A1, 0x4D3C_B2A1];

/// Classic libpcap files, either byte order, micro- or nanosecond stamps.
pub struct PcapSource<R: Read> {
    reader: LegacyPcapReader<R>,
    nanos: bool,
    stalls: u32,
}

impl<R: Read> PcapSource<R> {
    pub fn detect(head: &[u8]) -> bool {
        if head.len() < 4 {
            return false;
        }
        let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        MAGICS.contains(&magic)
    }

    pub fn new(r: R) -> anyhow::Result<Self> {
        let reader = LegacyPcapReader::new(PARSER_BUFFER, r)
            .map_err(|e| anyhow::anyhow!("not a valid pcap file: {:?}", e))?;
        Ok(Self { reader, nanos: false, stalls: 0 })
    }
}

impl<R: Read> PacketSource for PcapSource<R> {
    fn format(&self) -> CaptureFormat { CaptureFormat::Pcap }

    fn next_frame(&mut self) -> anyhow::Result<Option<CapturedFrame>> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    self.stalls = 0;
                    let frame = match block {
                        PcapBlockOwned::LegacyHeader(hdr) => {
                            self.nanos = hdr.is_nanosecond_precision();
                            if hdr.network != Linktype::ETHERNET {
                                warn!("pcap link type {:?} is not Ethernet; frames sent as-is", hdr.network);
                            }
                            None
                        }
                        PcapBlockOwned::Legacy(b) => {
                            let sub = if self.nanos {
                                Duration::from_nanos(b.ts_usec as u64)
                            } else {
                                Duration::from_micros(b.ts_usec as u64)
                            };
                            let ts = Duration::from_secs(b.ts_sec as u64) + sub;
                            Some(CapturedFrame::new(ts, b.data, b.origlen as usize))
                        }
                        PcapBlockOwned::NG(_) => None,
                    };
                    self.reader.consume(offset);
                    if frame.is_some() {
                        return Ok(frame);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete) => {
                    self.stalls += 1;
                    if self.stalls > MAX_STALLS {
                        anyhow::bail!("capture ends inside a record");
                    }
                    self.reader
                        .refill()
                        .map_err(|e| anyhow::anyhow!("pcap refill error: {:?}", e))?;
                }
                Err(e) => anyhow::bail!("pcap parse error: {:?}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testutil::{drain, pcap_bytes, Rec};
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn detects_all_magics() {
        assert!(PcapSource::<Cursor<Vec<u8>>>::detect(&[0xd4, 0xc3, 0xb2, 0xa1]));
        assert!(PcapSource::<Cursor<Vec<u8>>>::detect(&[0xa1, 0xb2, 0xc3, 0xd4]));
        assert!(PcapSource::<Cursor<Vec<u8>>>::detect(&[0x4d, 0x3c, 0xb2, 0xa1]));
        assert!(!PcapSource::<Cursor<Vec<u8>>>::detect(&[0x0a, 0x0d, 0x0d, 0x0a]));
        assert!(!PcapSource::<Cursor<Vec<u8>>>::detect(&[0xd4, 0xc3]));
    }

    #[test]
    fn nanosecond_precision_file() {
        let d = [7u8; 20];
        let mut bytes = pcap_bytes(&[Rec { sec: 5, usec: 123_456_789, data: &d, origlen: 20 }]);
        bytes[0..4].copy_from_slice(&0xA1B2_3C4Du32.to_le_bytes());
        let mut src = PcapSource::new(Cursor::new(bytes)).unwrap();
        let frames = drain(&mut src);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ts, Duration::new(5, 123_456_789));
    }

    #[test]
    fn big_endian_file() {
        let d = [9u8; 30];
        let mut v = Vec::new();
        v.extend_from_slice(&0xA1B2C3D4u32.to_be_bytes());
        v.extend_from_slice(&2u16.to_be_bytes());
        v.extend_from_slice(&4u16.to_be_bytes());
        v.extend_from_slice(&[0u8; 8]);
        v.extend_from_slice(&65535u32.to_be_bytes());
        v.extend_from_slice(&1u32.to_be_bytes());
        v.extend_from_slice(&9u32.to_be_bytes());
        v.extend_from_slice(&10u32.to_be_bytes());
        v.extend_from_slice(&30u32.to_be_bytes());
        v.extend_from_slice(&1500u32.to_be_bytes());
        v.extend_from_slice(&d);
        let mut src = PcapSource::new(Cursor::new(v)).unwrap();
        let frames = drain(&mut src);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].caplen, 30);
        assert_eq!(frames[0].origlen, 1500);
        assert_eq!(frames[0].ts, Duration::from_secs(9) + Duration::from_micros(10));
    }

    #[test]
    fn truncated_tail_is_an_error() {
        let d = [1u8; 40];
        let mut bytes = pcap_bytes(&[Rec { sec: 1, usec: 0, data: &d, origlen: 40 }]);
        bytes.truncate(bytes.len() - 5);
        let mut src = PcapSource::new(Cursor::new(bytes)).unwrap();
        assert!(src.next_frame().is_err());
    }

    proptest! {
        #[test]
        fn garbage_after_header_does_not_panic(tail in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut bytes = pcap_bytes(&[]);
            bytes.extend_from_slice(&tail);
            if let Ok(mut src) = PcapSource::new(Cursor::new(bytes)) {
                for _ in 0..64 {
                    match src.next_frame() {
                        Ok(Some(_)) => continue,
                        _ => break,
                    }
                }
            }
        }
    }
}
