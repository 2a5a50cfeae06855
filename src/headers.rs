// Ethernet / IPv4 header views over raw frames
// - Network byte order
// - #[repr(C)] unaligned structs via zerocopy; every accessor checks the
//   buffer is long enough before handing out a reference

use std::net::Ipv4Addr;
use zerocopy::byteorder::{NetworkEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Ref, Unaligned};

pub const ETH_HLEN: usize = 14;
pub const IPV4_MIN_HLEN: usize = 20;
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Largest frame the repairer will build: maximum IPv4 datagram plus Ethernet header.
pub const MAX_FRAME_LEN: usize = 65_535 + ETH_HLEN;

pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

#[repr(C)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct EthernetHeader {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ethertype: U16<NetworkEndian>,
}

#[repr(C)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub tos: u8,
    pub total_len: U16<NetworkEndian>,
    pub ident: U16<NetworkEndian>,
    pub frag_off: U16<NetworkEndian>,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: U16<NetworkEndian>,
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<EthernetHeader>() == ETH_HLEN);
const _: () = assert!(std::mem::size_of::<Ipv4Header>() == IPV4_MIN_HLEN);

impl Ipv4Header {
    #[inline]
    pub fn version(&self) -> u8 { self.version_ihl >> 4 }

    /// Header length in bytes as declared by IHL (options included).
    #[inline]
    pub fn header_len(&self) -> usize { ((self.version_ihl & 0x0f) as usize) * 4 }

    #[inline]
    pub fn source(&self) -> Ipv4Addr { Ipv4Addr::from(self.src) }
}

#[inline]
pub fn ethernet(frame: &[u8]) -> Option<&EthernetHeader> {
    Ref::<_, EthernetHeader>::new_unaligned_from_prefix(frame).map(|(h, _)| h.into_ref())
}

#[inline]
pub fn ethernet_mut(frame: &mut [u8]) -> Option<&mut EthernetHeader> {
    Ref::<_, EthernetHeader>::new_unaligned_from_prefix(frame).map(|(h, _)| h.into_mut())
}

#[inline]
pub fn ethertype(frame: &[u8]) -> Option<u16> {
    ethernet(frame).map(|h| h.ethertype.get())
}

#[inline]
pub fn is_ipv4(frame: &[u8]) -> bool {
    ethertype(frame) == Some(ETHERTYPE_IPV4)
}

/// IPv4 header of an Ethernet frame. Does not check the Ethertype.
#[inline]
pub fn ipv4(frame: &[u8]) -> Option<&Ipv4Header> {
    let l3 = frame.get(ETH_HLEN..)?;
    Ref::<_, Ipv4Header>::new_unaligned_from_prefix(l3).map(|(h, _)| h.into_ref())
}

#[inline]
pub fn ipv4_mut(frame: &mut [u8]) -> Option<&mut Ipv4Header> {
    let l3 = frame.get_mut(ETH_HLEN..)?;
    Ref::<_, Ipv4Header>::new_unaligned_from_prefix(l3).map(|(h, _)| h.into_mut())
}

/// Source address of an IPv4-over-Ethernet frame.
#[inline]
pub fn ipv4_source(frame: &[u8]) -> Option<Ipv4Addr> {
    if !is_ipv4(frame) {
        return None;
    }
    ipv4(frame).filter(|h| h.version() == 4).map(Ipv4Header::source)
}

/// Overwrites the Ethernet destination. Returns false when the frame is
/// too short to carry an Ethernet header.
#[inline]
pub fn set_destination_mac(frame: &mut [u8], mac: &[u8; 6]) -> bool {
    match ethernet_mut(frame) {
        Some(eth) => {
            eth.dst = *mac;
            true
        }
        None => false,
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::udp_frame;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reads_fields_in_network_order() {
        let f = udp_frame([10, 1, 2, 3], [192, 168, 0, 9], 4);
        assert_eq!(ethertype(&f), Some(ETHERTYPE_IPV4));
        let ip = ipv4(&f).unwrap();
        assert_eq!(ip.version(), 4);
        assert_eq!(ip.header_len(), 20);
        assert_eq!(ip.total_len.get(), 32);
        assert_eq!(ip.protocol, ip_proto::UDP);
        assert_eq!(ip.source(), Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(Ipv4Addr::from(ip.dst), Ipv4Addr::new(192, 168, 0, 9));
    }

    #[test]
    fn short_buffers_yield_none() {
        assert!(ethernet(&[0u8; 13]).is_none());
        assert!(ipv4(&[0u8; 33]).is_none());
        assert!(ipv4_source(&[0u8; 10]).is_none());
        let mut tiny = [0u8; 5];
        assert!(!set_destination_mac(&mut tiny, &[1; 6]));
        assert_eq!(tiny, [0u8; 5]);
    }

    #[test]
    fn non_ipv4_has_no_source() {
        let mut f = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 0);
        f[12..14].copy_from_slice(&0x86DDu16.to_be_bytes());
        assert!(ipv4_source(&f).is_none());
    }

    #[test]
    fn rewrites_destination_in_place() {
        let mut f = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 0);
        let before = f.clone();
        assert!(set_destination_mac(&mut f, &[0xde, 0xad, 0xbe, 0xef, 0, 1]));
        assert_eq!(&f[0..6], &[0xde, 0xad, 0xbe, 0xef, 0, 1]);
        assert_eq!(&f[6..], &before[6..]);
    }

    #[test]
    fn writes_through_mutable_view() {
        let mut f = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 10);
        ipv4_mut(&mut f).unwrap().total_len.set(0x1234);
        assert_eq!(&f[16..18], &[0x12, 0x34]);
    }

    proptest! {
        #[test]
        fn views_never_panic(frame in proptest::collection::vec(any::<u8>(), 0..80)) {
            let _ = ethertype(&frame);
            let _ = ipv4_source(&frame);
            let mut f = frame.clone();
            let wrote = set_destination_mac(&mut f, &[0xff; 6]);
            prop_assert_eq!(wrote, frame.len() >= ETH_HLEN);
            prop_assert_eq!(f.len(), frame.len());
        }
    }
}
