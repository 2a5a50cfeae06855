// src/checksum.rs
// One's-complement Internet checksum (RFC 1071) plus the IPv4 and TCP/UDP/ICMP
// fix-ups applied after a frame's length has been changed.

use crate::headers::{ip_proto, ipv4, ipv4_mut, ETH_HLEN, IPV4_MIN_HLEN};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("frame too short for an IPv4 header")]
    Truncated,
    #[error("malformed IPv4 length (ihl {ihl}, total {total})")]
    BadLength { ihl: usize, total: usize },
    #[error("{proto} header does not fit in {len} bytes")]
    ShortTransport { proto: &'static str, len: usize },
    #[error("unsupported layer 4 protocol {0}")]
    Unsupported(u8),
}

/// Running 32-bit sum of big-endian 16-bit words; an odd trailing byte is
/// padded with zero.
#[inline]
fn sum_words(data: &[u8], mut sum: u32) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for c in &mut chunks {
        sum += u16::from_be_bytes([c[0], c[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    sum
}

#[inline]
fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Internet checksum of `data`. Verifying a block that already carries its
/// checksum yields 0.
pub fn internet_checksum(data: &[u8]) -> u16 {
    fold(sum_words(data, 0))
}

/// Recomputes the IPv4 header checksum of an Ethernet frame in place.
pub fn fix_ipv4_header(frame: &mut [u8]) -> Result<(), ChecksumError> {
    let (hlen, total) = {
        let ip = ipv4(frame).ok_or(ChecksumError::Truncated)?;
        (ip.header_len(), ip.total_len.get() as usize)
    };
    let l3 = &mut frame[ETH_HLEN..];
    if hlen < IPV4_MIN_HLEN || hlen > l3.len() {
        return Err(ChecksumError::BadLength { ihl: hlen, total });
    }
    l3[10] = 0;
    l3[11] = 0;
    let csum = internet_checksum(&l3[..hlen]);
    if let Some(ip) = ipv4_mut(frame) {
        ip.checksum.set(csum);
    }
    Ok(())
}

/// Recomputes the transport checksum of an IPv4 frame in place. The segment
/// length comes from the IP total-length field, clamped to the bytes that
/// are actually present in the buffer.
pub fn fix_transport(frame: &mut [u8]) -> Result<(), ChecksumError> {
    let (hlen, total, proto, src, dst) = {
        let ip = ipv4(frame).ok_or(ChecksumError::Truncated)?;
        (ip.header_len(), ip.total_len.get() as usize, ip.protocol, ip.src, ip.dst)
    };
    let l3_avail = frame.len() - ETH_HLEN;
    if hlen < IPV4_MIN_HLEN || hlen > l3_avail || total < hlen {
        return Err(ChecksumError::BadLength { ihl: hlen, total });
    }
    let seg_len = (total - hlen).min(l3_avail - hlen);
    let start = ETH_HLEN + hlen;
    let segment = &mut frame[start..start + seg_len];

    let (name, off, min_len, pseudo) = match proto {
        ip_proto::TCP => ("tcp", 16, 20, true),
        ip_proto::UDP => ("udp", 6, 8, true),
        ip_proto::ICMP => ("icmp", 2, 4, false),
        other => return Err(ChecksumError::Unsupported(other)),
    };
    if segment.len() < min_len {
        return Err(ChecksumError::ShortTransport { proto: name, len: segment.len() });
    }

    segment[off] = 0;
    segment[off + 1] = 0;
    let mut sum = 0u32;
    if pseudo {
        sum = sum_words(&src, sum);
        sum = sum_words(&dst, sum);
        sum += proto as u32;
        sum += seg_len as u32;
    }
    let mut csum = fold(sum_words(segment, sum));
    if proto == ip_proto::UDP && csum == 0 {
        // zero means "no checksum" for UDP over IPv4
        csum = 0xFFFF;
    }
    segment[off..off + 2].copy_from_slice(&csum.to_be_bytes());
    Ok(())
}
