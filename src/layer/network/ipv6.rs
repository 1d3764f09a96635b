use std::net::Ipv6Addr;

use crate::engine::constants::{ip_proto, protocol_id};
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId, field_equals};
use crate::layer::transport::{tcp, udp};
use crate::packet::HeaderView;
use crate::state::FlowField;

use super::{ipv4, ipv6_at, ipv6_fragment};

pub const NAME: &str = "ipv6";
pub const ID: ProtocolId = protocol_id::IPV6;
pub const HEADER_LEN: usize = 40;

pub const VERSION: BitField = BitField::new(0, 4);
pub const TRAFFIC_CLASS: BitField = BitField::new(4, 8);
pub const FLOW_LABEL: BitField = BitField::new(12, 20);
pub const PAYLOAD_LENGTH: BitField = BitField::bytes(4, 2);
pub const NEXT_HEADER: BitField = BitField::bytes(6, 1);
pub const HOP_LIMIT: BitField = BitField::bytes(7, 1);

/// Fixed IPv6 header (RFC 8200). Extension headers other than Fragment are
/// left to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub version: u8,
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

impl Ipv6Header {
    pub fn from_view(view: &HeaderView<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            version: view.field(VERSION)? as u8,
            traffic_class: view.field(TRAFFIC_CLASS)? as u8,
            flow_label: view.field(FLOW_LABEL)? as u32,
            payload_length: view.field(PAYLOAD_LENGTH)? as u16,
            next_header: view.field(NEXT_HEADER)? as u8,
            hop_limit: view.field(HOP_LIMIT)? as u8,
            source: ipv6_at(view, 8)?,
            destination: ipv6_at(view, 24)?,
        })
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::Fixed(HEADER_LEN))
        .with_id(ID)
        .with_nicname("ip6")
        .bind(tcp::NAME, field_equals(NEXT_HEADER, u64::from(ip_proto::TCP)))
        .bind(udp::NAME, field_equals(NEXT_HEADER, u64::from(ip_proto::UDP)))
        .bind(
            ipv6_fragment::NAME,
            field_equals(NEXT_HEADER, u64::from(ip_proto::IPV6_FRAGMENT)),
        )
        .bind(ipv4::NAME, field_equals(NEXT_HEADER, u64::from(ip_proto::IPV4_IN_IP)))
        .bind(NAME, field_equals(NEXT_HEADER, u64::from(ip_proto::IPV6_IN_IP)))
        .flow_field(FlowField::reversible(8, 24, 16))
}
