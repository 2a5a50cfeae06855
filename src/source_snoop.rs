// src/source_snoop.rs
use crate::source::{CaptureFormat, CapturedFrame, PacketSource};
use log::warn;
use std::io::{self, Read};
use std::time::Duration;
use zerocopy::byteorder::{NetworkEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

pub const SNOOP_MAGIC: &[u8; 8] = b"snoop\0\0\0";
const SNOOP_VERSION: u32 = 2;
const DL_ETHER: u32 = 4;
/// Largest captured length accepted from a record header (a 256 KiB snaplen).
const MAX_INCL_LEN: usize = 256 * 1024;

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy)]
struct FileHeader {
    magic: [u8; 8],
    version: U32<NetworkEndian>,
    datalink: U32<NetworkEndian>,
}

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy)]
struct RecordHeader {
    orig_len: U32<NetworkEndian>,
    incl_len: U32<NetworkEndian>,
    rec_len: U32<NetworkEndian>,
    drops: U32<NetworkEndian>,
    ts_sec: U32<NetworkEndian>,
    ts_usec: U32<NetworkEndian>,
}

const RECORD_HDR: usize = std::mem::size_of::<RecordHeader>();

/// Solaris snoop (RFC 1761) reader. All fields are big-endian.
pub struct SnoopSource<R: Read> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> SnoopSource<R> {
    pub fn detect(head: &[u8]) -> bool { head.starts_with(SNOOP_MAGIC) }

    pub fn new(mut inner: R) -> anyhow::Result<Self> {
        let mut hdr = FileHeader::new_zeroed();
        inner.read_exact(hdr.as_bytes_mut())?;
        if &hdr.magic != SNOOP_MAGIC {
            anyhow::bail!("bad snoop magic");
        }
        if hdr.version.get() != SNOOP_VERSION {
            anyhow::bail!("unsupported snoop version {}", hdr.version.get());
        }
        if hdr.datalink.get() != DL_ETHER {
            warn!("snoop datalink {} is not Ethernet; frames sent as-is", hdr.datalink.get());
        }
        Ok(Self { inner, buf: Vec::with_capacity(2048) })
    }

    /// Fills `out` completely. `Ok(false)` only when EOF hits before the
    /// first byte.
    fn read_record_header(&mut self, out: &mut [u8]) -> anyhow::Result<bool> {
        let mut got = 0;
        while got < out.len() {
            match self.inner.read(&mut out[got..]) {
                Ok(0) if got == 0 => return Ok(false),
                Ok(0) => anyhow::bail!("snoop file ends inside a record header"),
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

impl<R: Read> PacketSource for SnoopSource<R> {
    fn format(&self) -> CaptureFormat { CaptureFormat::Snoop }

    fn next_frame(&mut self) -> anyhow::Result<Option<CapturedFrame>> {
        let mut rh = RecordHeader::new_zeroed();
        if !self.read_record_header(rh.as_bytes_mut())? {
            return Ok(None);
        }
        let incl = rh.incl_len.get() as usize;
        let rec_len = rh.rec_len.get() as usize;
        if incl > MAX_INCL_LEN {
            anyhow::bail!("snoop record claims {} captured bytes, limit is {}", incl, MAX_INCL_LEN);
        }
        if rec_len < RECORD_HDR + incl {
            anyhow::bail!("snoop record length {} too small for {} captured bytes", rec_len, incl);
        }

        self.buf.resize(incl, 0);
        self.inner.read_exact(&mut self.buf)?;
        let pad = (rec_len - RECORD_HDR - incl) as u64;
        if pad > 0 {
            let skipped = io::copy(&mut (&mut self.inner).take(pad), &mut io::sink())?;
            if skipped != pad {
                anyhow::bail!("snoop file ends inside record padding");
            }
        }

        let ts = Duration::from_secs(rh.ts_sec.get() as u64)
            + Duration::from_micros(rh.ts_usec.get() as u64);
        Ok(Some(CapturedFrame::new(ts, &self.buf, rh.orig_len.get() as usize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testutil::{drain, snoop_bytes, Rec};
    use std::io::Cursor;

    #[test]
    fn reads_records_and_skips_padding() {
        let a = [0x11u8; 61];
        let b = [0x22u8; 64];
        let bytes = snoop_bytes(&[
            Rec { sec: 10, usec: 1, data: &a, origlen: 61 },
            Rec { sec: 11, usec: 999_999, data: &b, origlen: 1514 },
        ]);
        let mut src = SnoopSource::new(Cursor::new(bytes)).unwrap();
        let frames = drain(&mut src);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].data[..], &a[..]);
        assert_eq!(frames[1].caplen, 64);
        assert_eq!(frames[1].origlen, 1514);
        assert_eq!(frames[1].ts, Duration::new(11, 999_999_000));
    }

    #[test]
    fn rejects_other_versions() {
        let mut bytes = snoop_bytes(&[]);
        bytes[8..12].copy_from_slice(&1u32.to_be_bytes());
        assert!(SnoopSource::new(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn short_record_length_is_an_error() {
        let d = [0u8; 40];
        let mut bytes = snoop_bytes(&[Rec { sec: 1, usec: 0, data: &d, origlen: 40 }]);
        // rec_len sits at offset 8 of the first record
        bytes[16 + 8..16 + 12].copy_from_slice(&30u32.to_be_bytes());
        let mut src = SnoopSource::new(Cursor::new(bytes)).unwrap();
        assert!(src.next_frame().is_err());
    }

    #[test]
    fn oversized_captured_length_is_rejected_without_allocating() {
        let d = [0u8; 36];
        let mut bytes = snoop_bytes(&[Rec { sec: 1, usec: 0, data: &d, origlen: 36 }]);
        bytes[16 + 4..16 + 8].copy_from_slice(&0xC000_0000u32.to_be_bytes());
        bytes[16 + 8..16 + 12].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        let mut src = SnoopSource::new(Cursor::new(bytes)).unwrap();
        let err = src.next_frame().unwrap_err();
        assert!(err.to_string().contains("limit"), "{err}");
        assert!(src.buf.capacity() <= MAX_INCL_LEN);
    }

    #[test]
    fn partial_header_is_an_error_but_clean_eof_is_not() {
        let d = [0u8; 20];
        let mut bytes = snoop_bytes(&[Rec { sec: 1, usec: 0, data: &d, origlen: 20 }]);
        let full = bytes.len();
        let mut src = SnoopSource::new(Cursor::new(bytes.clone())).unwrap();
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_none());

        bytes.extend_from_slice(&[0u8; 7]);
        assert_eq!(bytes.len(), full + 7);
        let mut src = SnoopSource::new(Cursor::new(bytes)).unwrap();
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().is_err());
    }

    #[test]
    fn detect_needs_full_magic() {
        assert!(SnoopSource::<Cursor<Vec<u8>>>::detect(b"snoop\0\0\0\0\0\0\x02"));
        assert!(!SnoopSource::<Cursor<Vec<u8>>>::detect(b"snoop"));
        assert!(!SnoopSource::<Cursor<Vec<u8>>>::detect(b"\xd4\xc3\xb2\xa1"));
    }
}
