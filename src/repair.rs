// src/repair.rs
use crate::checksum::{fix_ipv4_header, fix_transport, ChecksumError};
use crate::config::RepairMode;
use crate::headers::{self, MAX_FRAME_LEN};
use crate::metrics;
use crate::source::CapturedFrame;
use log::{debug, warn};

/// Rebuilds frames that the capture device cut short so the kernel and the
/// receiver see a self-consistent IPv4 packet.
#[derive(Debug, Clone, Copy)]
pub struct PacketRepairer {
    mode: RepairMode,
}

impl PacketRepairer {
    pub fn new(mode: RepairMode) -> Self { Self { mode } }

    /// Returns true if the frame was changed. Checksum failures are logged
    /// and the frame goes out with whatever it carries.
    pub fn apply(&self, frame: &mut CapturedFrame) -> bool {
        if self.mode == RepairMode::None || !frame.is_truncated() || !headers::is_ipv4(&frame.data) {
            return false;
        }
        let label = match self.mode {
            RepairMode::Pad => {
                if frame.origlen > MAX_FRAME_LEN {
                    warn!("original length {} exceeds max frame size; sending as captured", frame.origlen);
                    return false;
                }
                frame.data.resize(frame.origlen, 0);
                "pad"
            }
            RepairMode::Truncate => {
                let caplen = frame.caplen.min(u16::MAX as usize) as u16;
                match headers::ipv4_mut(&mut frame.data) {
                    Some(ip) => ip.total_len.set(caplen),
                    None => {
                        debug!("{} byte frame has no room for an IPv4 header", frame.caplen);
                        return false;
                    }
                }
                "trunc"
            }
            RepairMode::None => return false,
        };

        if let Err(e) = refresh_checksums(&mut frame.data) {
            warn!("checksum repair failed ({e}); sending frame unchanged otherwise");
            metrics::inc_checksum_failure();
        }
        metrics::inc_repaired(label);
        true
    }
}

fn refresh_checksums(frame: &mut [u8]) -> Result<(), ChecksumError> {
    let transport = fix_transport(frame);
    fix_ipv4_header(frame)?;
    transport
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::internet_checksum;
    use crate::headers::testutil::udp_frame;
    use crate::headers::{ipv4, ETH_HLEN, IPV4_MIN_HLEN};
    use std::time::Duration;

    /// 100 byte frame on the wire, 60 captured.
    fn truncated() -> (Vec<u8>, CapturedFrame) {
        let full = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 100 - ETH_HLEN - IPV4_MIN_HLEN - 8);
        assert_eq!(full.len(), 100);
        let f = CapturedFrame::new(Duration::ZERO, &full[..60], 100);
        (full, f)
    }

    /// Offset of the UDP checksum in `udp_frame` output.
    const UDP_SUM: usize = ETH_HLEN + IPV4_MIN_HLEN + 6;

    fn ip_header_ok(frame: &[u8]) -> bool {
        internet_checksum(&frame[ETH_HLEN..ETH_HLEN + IPV4_MIN_HLEN]) == 0
    }

    /// Verifies the transport checksum over the bytes actually present.
    fn transport_ok(frame: &[u8]) -> bool {
        let ip = ipv4(frame).unwrap();
        let start = ETH_HLEN + ip.header_len();
        let end = (ETH_HLEN + ip.total_len.get() as usize).min(frame.len());
        let seg = &frame[start..end];
        let mut buf = Vec::with_capacity(12 + seg.len());
        buf.extend_from_slice(&ip.src);
        buf.extend_from_slice(&ip.dst);
        buf.extend_from_slice(&[0, ip.protocol]);
        buf.extend_from_slice(&(seg.len() as u16).to_be_bytes());
        buf.extend_from_slice(seg);
        internet_checksum(&buf) == 0
    }

    #[test]
    fn pad_restores_original_length() {
        let (full, mut f) = truncated();
        let input = f.data.clone();
        assert!(PacketRepairer::new(RepairMode::Pad).apply(&mut f));
        assert_eq!(f.data.len(), 100);
        // payload kept; the UDP checksum is recomputed over the zero padding
        assert_eq!(&f.data[..UDP_SUM], &input[..UDP_SUM]);
        assert_eq!(&f.data[UDP_SUM + 2..60], &input[UDP_SUM + 2..]);
        assert!(f.data[60..].iter().all(|&b| b == 0));
        assert_eq!(ipv4(&f.data).unwrap().total_len.get() as usize, full.len() - ETH_HLEN);
        assert!(ip_header_ok(&f.data));
        assert!(transport_ok(&f.data));
        assert_eq!(f.caplen, 60);
    }

    #[test]
    fn truncate_rewrites_total_length() {
        let (_, mut f) = truncated();
        assert!(PacketRepairer::new(RepairMode::Truncate).apply(&mut f));
        assert_eq!(f.data.len(), 60);
        assert_eq!(ipv4(&f.data).unwrap().total_len.get(), 60);
        assert!(ip_header_ok(&f.data));
        assert!(transport_ok(&f.data));
    }

    #[test]
    fn untouched_when_disabled_complete_or_not_ipv4() {
        let (_, mut f) = truncated();
        let before = f.data.clone();
        assert!(!PacketRepairer::new(RepairMode::None).apply(&mut f));
        assert_eq!(f.data, before);

        let whole = udp_frame([1, 2, 3, 4], [5, 6, 7, 8], 10);
        let mut f = CapturedFrame::new(Duration::ZERO, &whole, whole.len());
        assert!(!PacketRepairer::new(RepairMode::Pad).apply(&mut f));
        assert_eq!(&f.data[..], &whole[..]);

        let mut arp = udp_frame([1, 2, 3, 4], [5, 6, 7, 8], 40);
        arp[12..14].copy_from_slice(&0x0806u16.to_be_bytes());
        let mut f = CapturedFrame::new(Duration::ZERO, &arp[..42], arp.len());
        assert!(!PacketRepairer::new(RepairMode::Truncate).apply(&mut f));
        assert_eq!(&f.data[..], &arp[..42]);
    }

    #[test]
    fn unsupported_protocol_still_repairs_ip_header() {
        let (_, mut f) = truncated();
        f.data[ETH_HLEN + 9] = 47; // GRE
        assert!(PacketRepairer::new(RepairMode::Pad).apply(&mut f));
        assert_eq!(f.data.len(), 100);
        assert!(ip_header_ok(&f.data));
    }

    #[test]
    fn oversized_original_length_is_left_alone() {
        let (_, f) = truncated();
        let mut f = CapturedFrame::new(Duration::ZERO, &f.data, MAX_FRAME_LEN + 1);
        assert!(!PacketRepairer::new(RepairMode::Pad).apply(&mut f));
        assert_eq!(f.data.len(), 60);
    }
}
