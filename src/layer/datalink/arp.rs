use std::net::Ipv4Addr;

use crate::engine::constants::protocol_id;
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId, Shortfall};
use crate::packet::HeaderView;

pub const NAME: &str = "arp";
pub const ID: ProtocolId = protocol_id::ARP;
/// Fixed part before the variable-length addresses.
pub const FIXED_LEN: usize = 8;

pub const HARDWARE_TYPE: BitField = BitField::bytes(0, 2);
pub const PROTOCOL_TYPE: BitField = BitField::bytes(2, 2);
pub const HARDWARE_LEN: BitField = BitField::bytes(4, 1);
pub const PROTOCOL_LEN: BitField = BitField::bytes(5, 1);
pub const OPERATION: BitField = BitField::bytes(6, 2);

/// ARP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    Request,
    Reply,
    /// For unrecognized operation codes.
    Unknown(u16),
}

impl From<u16> for ArpOperation {
    fn from(code: u16) -> Self {
        match code {
            1 => ArpOperation::Request,
            2 => ArpOperation::Reply,
            other => ArpOperation::Unknown(other),
        }
    }
}

/// ARP packet (RFC 826) with address lengths taken from the header, so
/// non-Ethernet/IPv4 variants are placed correctly too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket<'a> {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub operation: ArpOperation,
    pub sender_hardware_addr: &'a [u8],
    pub sender_protocol_addr: &'a [u8],
    pub target_hardware_addr: &'a [u8],
    pub target_protocol_addr: &'a [u8],
}

impl<'a> ArpPacket<'a> {
    pub fn from_view(view: &HeaderView<'a>) -> Result<Self, FieldError> {
        let hlen = view.field(HARDWARE_LEN)? as usize;
        let plen = view.field(PROTOCOL_LEN)? as usize;
        let sha = FIXED_LEN;
        let spa = sha + hlen;
        let tha = spa + plen;
        let tpa = tha + hlen;

        Ok(Self {
            hardware_type: view.field(HARDWARE_TYPE)? as u16,
            protocol_type: view.field(PROTOCOL_TYPE)? as u16,
            operation: ArpOperation::from(view.field(OPERATION)? as u16),
            sender_hardware_addr: view.bytes_at(sha, hlen)?,
            sender_protocol_addr: view.bytes_at(spa, plen)?,
            target_hardware_addr: view.bytes_at(tha, hlen)?,
            target_protocol_addr: view.bytes_at(tpa, plen)?,
        })
    }

    pub fn sender_ipv4(&self) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.sender_protocol_addr.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    pub fn target_ipv4(&self) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.target_protocol_addr.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

/// `8 + 2 * hlen + 2 * plen`.
pub fn header_len(tail: &[u8]) -> Result<usize, Shortfall> {
    let (Some(&hlen), Some(&plen)) = (tail.get(4), tail.get(5)) else {
        return Err(Shortfall { needed: 6 });
    };
    Ok(FIXED_LEN + 2 * usize::from(hlen) + 2 * usize::from(plen))
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::custom(header_len)).with_id(ID)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::{ArpOperation, ArpPacket, ID, header_len};
    use crate::engine::Shortfall;
    use crate::packet::{HeaderRecord, HeaderView};

    fn request() -> Vec<u8> {
        let mut arp = vec![0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01];
        arp.extend_from_slice(&[0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
        arp.extend_from_slice(&[192, 168, 1, 10]);
        arp.extend_from_slice(&[0; 6]);
        arp.extend_from_slice(&[192, 168, 1, 1]);
        arp
    }

    #[test]
    fn length_follows_address_sizes() {
        assert_eq!(header_len(&request()), Ok(28));
        assert_eq!(header_len(&[0, 1, 8, 0, 6]), Err(Shortfall { needed: 6 }));
    }

    #[test]
    fn decodes_ipv4_request() {
        let data = request();
        let record = HeaderRecord {
            protocol: ID,
            offset: 0,
            length: data.len(),
            instance: 0,
        };
        let view = HeaderView::new(&data, record).expect("fits");
        let arp = ArpPacket::from_view(&view).expect("decodes");

        assert_eq!(arp.operation, ArpOperation::Request);
        assert_eq!(arp.protocol_type, 0x0800);
        assert_eq!(arp.sender_ipv4(), Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(arp.target_ipv4(), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(arp.target_hardware_addr, &[0; 6]);
    }
}
