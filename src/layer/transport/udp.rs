use crate::engine::constants::protocol_id;
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId};
use crate::packet::HeaderView;
use crate::state::FlowField;

use super::ports;

pub const NAME: &str = "udp";
pub const ID: ProtocolId = protocol_id::UDP;
pub const HEADER_LEN: usize = 8;

/// Header plus data, in bytes.
pub const LENGTH: BitField = BitField::bytes(4, 2);
pub const CHECKSUM: BitField = BitField::bytes(6, 2);

/// UDP header (RFC 768): source port, destination port, length, checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub fn from_view(view: &HeaderView<'_>) -> Result<Self, FieldError> {
        let (source_port, destination_port) = ports(view)?;
        Ok(Self {
            source_port,
            destination_port,
            length: view.field(LENGTH)? as u16,
            checksum: view.field(CHECKSUM)? as u16,
        })
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::Fixed(HEADER_LEN))
        .with_id(ID)
        .flow_field(FlowField::reversible(0, 2, 2))
}
