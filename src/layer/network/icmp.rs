use crate::engine::constants::protocol_id;
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId};
use crate::packet::HeaderView;

pub const NAME: &str = "icmp";
pub const ID: ProtocolId = protocol_id::ICMP;
pub const HEADER_LEN: usize = 8;

pub const TYPE: BitField = BitField::bytes(0, 1);
pub const CODE: BitField = BitField::bytes(1, 1);
pub const CHECKSUM: BitField = BitField::bytes(2, 2);
/// Identifier and sequence number for echo messages.
pub const REST_OF_HEADER: BitField = BitField::bytes(4, 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestinationUnreachable,
    EchoRequest,
    TimeExceeded,
    Other(u8),
}

impl From<u8> for IcmpType {
    fn from(value: u8) -> Self {
        match value {
            0 => IcmpType::EchoReply,
            3 => IcmpType::DestinationUnreachable,
            8 => IcmpType::EchoRequest,
            11 => IcmpType::TimeExceeded,
            other => IcmpType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: IcmpType,
    pub code: u8,
    pub checksum: u16,
    pub rest_of_header: u32,
}

impl IcmpHeader {
    pub fn from_view(view: &HeaderView<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            icmp_type: IcmpType::from(view.field(TYPE)? as u8),
            code: view.field(CODE)? as u8,
            checksum: view.field(CHECKSUM)? as u16,
            rest_of_header: view.field(REST_OF_HEADER)? as u32,
        })
    }

    /// `(identifier, sequence)` of echo request/reply messages.
    pub fn echo(&self) -> Option<(u16, u16)> {
        matches!(self.icmp_type, IcmpType::EchoRequest | IcmpType::EchoReply)
            .then(|| ((self.rest_of_header >> 16) as u16, self.rest_of_header as u16))
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::Fixed(HEADER_LEN)).with_id(ID)
}
