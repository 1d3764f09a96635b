use std::net::Ipv4Addr;

use bytes::Bytes;

use super::fragment::{Fragment, FragmentAssembler};
use crate::layer::network::ipv4::{self, Ipv4Header};
use crate::packet::{PacketState, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ipv4FragmentKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub identification: u16,
    pub protocol: u8,
}

pub type Ipv4Reassembler = FragmentAssembler<Ipv4FragmentKey>;

/// The fragment carried by the innermost fragmented IPv4 header.
///
/// Headers are checked from the innermost outward: the first fragment of a
/// fragmented tunnel exposes an unfragmented inner header, and the outer one
/// owns the sequence.
pub fn extract(state: &PacketState, data: &[u8], timestamp: Timestamp) -> Option<(Ipv4FragmentKey, Fragment)> {
    let instances = u16::try_from(state.instance_count(ipv4::ID)).ok()?;
    (0..instances).rev().find_map(|instance| {
        let view = state.view(data, ipv4::ID, instance)?;
        let header = Ipv4Header::from_view(&view).ok()?;
        if !header.is_fragment() {
            return None;
        }

        let payload = ipv4::datagram_payload(&view).ok()?;
        let key = Ipv4FragmentKey {
            src: header.source,
            dst: header.destination,
            identification: header.identification,
            protocol: header.protocol,
        };
        let fragment = Fragment::with_payload(
            header.fragment_offset_bytes(),
            Bytes::copy_from_slice(payload),
            header.more_fragments,
            timestamp,
        );
        Some((key, fragment))
    })
}
