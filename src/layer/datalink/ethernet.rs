use crate::engine::constants::protocol_id;
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId};
use crate::packet::HeaderView;

use super::{MacAddr, bind_ethertype};

pub const NAME: &str = "ethernet";
pub const ID: ProtocolId = protocol_id::ETHERNET;
pub const HEADER_LEN: usize = 14;

pub const ETHERTYPE: BitField = BitField::bytes(12, 2);

/// Ethernet II frame header:
///
///   +-------------------+-------------------+-------------+
///   | Destination (48)  |   Source (48)     | EtherType   |
///   +-------------------+-------------------+-------------+
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn from_view(view: &HeaderView<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            destination: mac_at(view, 0)?,
            source: mac_at(view, 6)?,
            ethertype: view.field(ETHERTYPE)? as u16,
        })
    }
}

pub(crate) fn mac_at(view: &HeaderView<'_>, offset: usize) -> Result<MacAddr, FieldError> {
    let bytes = view.bytes_at(offset, 6)?;
    MacAddr::from_slice(bytes).ok_or(FieldError::OutOfBounds {
        bit_offset: offset * 8,
        bit_length: 48,
        available: view.len(),
    })
}

pub fn descriptor() -> ProtocolDescriptor {
    let descriptor = ProtocolDescriptor::new(NAME, LengthRule::Fixed(HEADER_LEN))
        .with_id(ID)
        .with_nicname("eth");
    bind_ethertype(descriptor, ETHERTYPE)
}
