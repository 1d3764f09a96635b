//! The datalink layer (Layer 2) modules: Ethernet II, 802.1Q/802.1ad tags
//! and ARP.

pub mod arp;
pub mod ethernet;
pub mod vlan;

use crate::engine::constants::ethertype;
use crate::engine::{BitField, ProtocolDescriptor, field_equals, field_in};

use super::network::{ipv4, ipv6};

/// Attaches the EtherType dispatch shared by Ethernet and VLAN tags.
pub(crate) fn bind_ethertype(descriptor: ProtocolDescriptor, field: BitField) -> ProtocolDescriptor {
    descriptor
        .bind(ipv4::NAME, field_equals(field, u64::from(ethertype::IPV4)))
        .bind(ipv6::NAME, field_equals(field, u64::from(ethertype::IPV6)))
        .bind(arp::NAME, field_equals(field, u64::from(ethertype::ARP)))
        .bind(
            vlan::NAME,
            field_in(field, &[ethertype::VLAN_8021Q as u64, ethertype::QINQ_8021AD as u64]),
        )
}

/// Six-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.try_into().ok()?))
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
