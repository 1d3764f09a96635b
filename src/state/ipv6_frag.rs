use std::net::Ipv6Addr;

use bytes::Bytes;

use super::fragment::{Fragment, FragmentAssembler};
use crate::layer::network::ipv6::{self, Ipv6Header};
use crate::layer::network::ipv6_fragment::{self, FragmentHeader};
use crate::packet::{HeaderView, PacketState, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ipv6FragmentKey {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub identification: u32,
}

pub type Ipv6Reassembler = FragmentAssembler<Ipv6FragmentKey>;

/// The fragment described by the innermost IPv6 Fragment header and the
/// IPv6 header in front of it.
pub fn extract(state: &PacketState, data: &[u8], timestamp: Timestamp) -> Option<(Ipv6FragmentKey, Fragment)> {
    let frag_record = state
        .iter()
        .rev()
        .find(|record| record.protocol == ipv6_fragment::ID)?;
    let ip_record = state
        .iter()
        .rev()
        .find(|record| record.protocol == ipv6::ID && record.end() <= frag_record.offset)?;

    let ip = Ipv6Header::from_view(&HeaderView::new(data, *ip_record)?).ok()?;
    let frag_view = HeaderView::new(data, *frag_record)?;
    let frag = FragmentHeader::from_view(&frag_view).ok()?;

    let datagram_end = (ip_record.end() + usize::from(ip.payload_length)).min(data.len());
    let payload = data.get(frag_record.end()..datagram_end).unwrap_or(&[]);

    let key = Ipv6FragmentKey {
        src: ip.source,
        dst: ip.destination,
        identification: frag.identification,
    };
    let fragment = Fragment::with_payload(
        frag.fragment_offset_bytes(),
        Bytes::copy_from_slice(payload),
        frag.more_fragments,
        timestamp,
    );
    Some((key, fragment))
}
