use std::net::Ipv4Addr;

use crate::engine::constants::{ip_proto, protocol_id};
use crate::engine::{
    BindingContext, BitField, FieldError, LengthRule, PredicateError, ProtocolDescriptor, ProtocolId,
};
use crate::layer::transport::{tcp, udp};
use crate::packet::HeaderView;
use crate::state::FlowField;

use super::{icmp, ipv4_at, ipv6, ones_complement_sum};

pub const NAME: &str = "ipv4";
pub const ID: ProtocolId = protocol_id::IPV4;
pub const MIN_HEADER_LEN: usize = 20;

pub const VERSION: BitField = BitField::new(0, 4);
pub const IHL: BitField = BitField::new(4, 4);
pub const DSCP: BitField = BitField::new(8, 6);
pub const ECN: BitField = BitField::new(14, 2);
pub const TOTAL_LENGTH: BitField = BitField::bytes(2, 2);
pub const IDENTIFICATION: BitField = BitField::bytes(4, 2);
pub const DONT_FRAGMENT: BitField = BitField::new(49, 1);
pub const MORE_FRAGMENTS: BitField = BitField::new(50, 1);
/// In units of 8 bytes.
pub const FRAGMENT_OFFSET: BitField = BitField::new(51, 13);
pub const TTL: BitField = BitField::bytes(8, 1);
pub const PROTOCOL: BitField = BitField::bytes(9, 1);
pub const CHECKSUM: BitField = BitField::bytes(10, 2);

/// IPv4 Header
///
/// The IPv4 header format is defined in RFC 791:
///
///   +---------------------------------------------------------------+
///   | Version (4) | IHL (4) | DSCP (6) | ECN (2)                    |
///   +---------------------------------------------------------------+
///   |                     Total Length (16)                         |
///   +---------------------------------------------------------------+
///   |                   Identification (16)                         |
///   +---------------------------------------------------------------+
///   |Flags (3)|         Fragment Offset (13)                        |
///   +---------------------------------------------------------------+
///   |   TTL (8)   |   Protocol (8)    |    Header Checksum (16)     |
///   +---------------------------------------------------------------+
///   |                   Source IP Address (32)                      |
///   +---------------------------------------------------------------+
///   |                Destination IP Address (32)                    |
///   +---------------------------------------------------------------+
///   |             Options (if IHL > 5; Variable length)             |
///   +---------------------------------------------------------------+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header<'a> {
    pub version: u8,
    /// Internet Header Length in 32-bit words.
    pub ihl: u8,
    pub dscp: u8,
    pub ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// Fragment offset in 8-byte units.
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub options: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    pub fn from_view(view: &HeaderView<'a>) -> Result<Self, FieldError> {
        Ok(Self {
            version: view.field(VERSION)? as u8,
            ihl: view.field(IHL)? as u8,
            dscp: view.field(DSCP)? as u8,
            ecn: view.field(ECN)? as u8,
            total_length: view.field(TOTAL_LENGTH)? as u16,
            identification: view.field(IDENTIFICATION)? as u16,
            dont_fragment: view.field(DONT_FRAGMENT)? == 1,
            more_fragments: view.field(MORE_FRAGMENTS)? == 1,
            fragment_offset: view.field(FRAGMENT_OFFSET)? as u16,
            ttl: view.field(TTL)? as u8,
            protocol: view.field(PROTOCOL)? as u8,
            checksum: view.field(CHECKSUM)? as u16,
            source: ipv4_at(view, 12)?,
            destination: ipv4_at(view, 16)?,
            options: view.bytes().get(MIN_HEADER_LEN..).unwrap_or(&[]),
        })
    }

    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset != 0
    }

    pub fn fragment_offset_bytes(&self) -> usize {
        usize::from(self.fragment_offset) * 8
    }
}

pub fn checksum_valid(view: &HeaderView<'_>) -> bool {
    ones_complement_sum(view.bytes()) == 0xffff
}

/// Bytes after the header that belong to this datagram; link-layer padding
/// past Total Length is excluded.
pub fn datagram_payload<'a>(view: &HeaderView<'a>) -> Result<&'a [u8], FieldError> {
    let total = view.field(TOTAL_LENGTH)? as usize;
    let payload = view.payload();
    let len = total.saturating_sub(view.len()).min(payload.len());
    Ok(&payload[..len])
}

/// Only the first fragment carries the next protocol's header.
fn carries(protocol: u8) -> impl Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static {
    move |ctx: &BindingContext<'_>| {
        Ok(ctx.field(PROTOCOL)? == u64::from(protocol) && ctx.field(FRAGMENT_OFFSET)? == 0)
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::field(IHL, 4, MIN_HEADER_LEN))
        .with_id(ID)
        .with_nicname("ip4")
        .bind(tcp::NAME, carries(ip_proto::TCP))
        .bind(udp::NAME, carries(ip_proto::UDP))
        .bind(icmp::NAME, carries(ip_proto::ICMP))
        .bind(NAME, carries(ip_proto::IPV4_IN_IP))
        .bind(ipv6::NAME, carries(ip_proto::IPV6_IN_IP))
        .flow_field(FlowField::reversible(12, 16, 4))
        .flow_field(FlowField::fixed(9, 1))
}
