use crate::engine::constants::protocol_id;
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId};
use crate::packet::HeaderView;
use crate::state::FlowField;

use super::ports;

pub const NAME: &str = "tcp";
pub const ID: ProtocolId = protocol_id::TCP;
pub const MIN_HEADER_LEN: usize = 20;

pub const SEQUENCE: BitField = BitField::bytes(4, 4);
pub const ACKNOWLEDGMENT: BitField = BitField::bytes(8, 4);
/// Header length in 32-bit words.
pub const DATA_OFFSET: BitField = BitField::new(96, 4);
/// NS through FIN.
pub const FLAGS: BitField = BitField::new(103, 9);
pub const WINDOW: BitField = BitField::bytes(14, 2);
pub const CHECKSUM: BitField = BitField::bytes(16, 2);
pub const URGENT_POINTER: BitField = BitField::bytes(18, 2);

/// TCP Flags as defined in RFC 793
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool, // 0x01 - Finish, no more data from sender
    pub syn: bool, // 0x02 - Synchronize sequence numbers
    pub rst: bool, // 0x04 - Reset the connection
    pub psh: bool, // 0x08 - Push function
    pub ack: bool, // 0x10 - Acknowledgment field is significant
    pub urg: bool, // 0x20 - Urgent pointer field is significant
    pub ece: bool, // 0x40 - ECN-Echo
    pub cwr: bool, // 0x80 - Congestion Window Reduced
    pub ns: bool,  // 0x100 - ECN-nonce concealment protection (RFC 3540)
}

impl From<u16> for TcpFlags {
    fn from(bits: u16) -> Self {
        Self {
            fin: bits & 0x001 != 0,
            syn: bits & 0x002 != 0,
            rst: bits & 0x004 != 0,
            psh: bits & 0x008 != 0,
            ack: bits & 0x010 != 0,
            urg: bits & 0x020 != 0,
            ece: bits & 0x040 != 0,
            cwr: bits & 0x080 != 0,
            ns: bits & 0x100 != 0,
        }
    }
}

/// Represents a TCP packet header.
///
/// The TCP header format is defined in RFC 793 and consists of:
/// - Source Port (16 bits)
/// - Destination Port (16 bits)
/// - Sequence Number (32 bits)
/// - Acknowledgment Number (32 bits)
/// - Data Offset (4 bits): Size of TCP header in 32-bit words
/// - Reserved (3 bits)
/// - Flags (9 bits): NS, CWR, ECE, URG, ACK, PSH, RST, SYN, FIN
/// - Window Size (16 bits)
/// - Checksum (16 bits)
/// - Urgent Pointer (16 bits)
/// - Options (variable length, optional)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader<'a> {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
    pub options: &'a [u8],
}

impl<'a> TcpHeader<'a> {
    pub fn from_view(view: &HeaderView<'a>) -> Result<Self, FieldError> {
        let (source_port, destination_port) = ports(view)?;
        Ok(Self {
            source_port,
            destination_port,
            sequence_number: view.field(SEQUENCE)? as u32,
            acknowledgment_number: view.field(ACKNOWLEDGMENT)? as u32,
            data_offset: view.field(DATA_OFFSET)? as u8,
            flags: TcpFlags::from(view.field(FLAGS)? as u16),
            window_size: view.field(WINDOW)? as u16,
            checksum: view.field(CHECKSUM)? as u16,
            urgent_pointer: view.field(URGENT_POINTER)? as u16,
            options: view.bytes().get(MIN_HEADER_LEN..).unwrap_or(&[]),
        })
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::field(DATA_OFFSET, 4, MIN_HEADER_LEN))
        .with_id(ID)
        .flow_field(FlowField::reversible(0, 2, 2))
}
