pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN_8021Q: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ_8021AD: u16 = 0x88A8;
}

pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const IPV4_IN_IP: u8 = 4;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const IPV6_IN_IP: u8 = 41;
    pub const IPV6_FRAGMENT: u8 = 44;
}

pub mod port {
    pub const HTTP: u16 = 80;
    pub const HTTP_ALT: u16 = 8080;
}

/// Ids of the built-in protocols, pinned so that they stay stable no matter
/// which other protocols a caller registers.
pub mod protocol_id {
    use crate::engine::registry::ProtocolId;

    pub const ETHERNET: ProtocolId = ProtocolId::new(1);
    pub const VLAN: ProtocolId = ProtocolId::new(2);
    pub const ARP: ProtocolId = ProtocolId::new(3);
    pub const IPV4: ProtocolId = ProtocolId::new(4);
    pub const IPV6: ProtocolId = ProtocolId::new(5);
    pub const IPV6_FRAGMENT: ProtocolId = ProtocolId::new(6);
    pub const ICMP: ProtocolId = ProtocolId::new(7);
    pub const TCP: ProtocolId = ProtocolId::new(8);
    pub const UDP: ProtocolId = ProtocolId::new(9);
    pub const HTTP: ProtocolId = ProtocolId::new(10);
}
