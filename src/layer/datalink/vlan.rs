use crate::engine::constants::protocol_id;
use crate::engine::{BitField, FieldError, LengthRule, ProtocolDescriptor, ProtocolId};
use crate::packet::HeaderView;
use crate::state::FlowField;

use super::bind_ethertype;

pub const NAME: &str = "vlan";
pub const ID: ProtocolId = protocol_id::VLAN;
pub const HEADER_LEN: usize = 4;

pub const PRIORITY: BitField = BitField::new(0, 3);
pub const DROP_ELIGIBLE: BitField = BitField::new(3, 1);
pub const VLAN_ID: BitField = BitField::new(4, 12);
pub const ETHERTYPE: BitField = BitField::bytes(2, 2);

/// 802.1Q / 802.1ad tag, as it follows the EtherType that announced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    pub priority: u8,
    pub drop_eligible: bool,
    pub vlan_id: u16,
    pub ethertype: u16,
}

impl VlanTag {
    pub fn from_view(view: &HeaderView<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            priority: view.field(PRIORITY)? as u8,
            drop_eligible: view.field(DROP_ELIGIBLE)? == 1,
            vlan_id: view.field(VLAN_ID)? as u16,
            ethertype: view.field(ETHERTYPE)? as u16,
        })
    }
}

/// The tag control field (priority bits included) separates flows per VLAN.
pub fn descriptor() -> ProtocolDescriptor {
    let descriptor = ProtocolDescriptor::new(NAME, LengthRule::Fixed(HEADER_LEN))
        .with_id(ID)
        .with_nicname("802.1q")
        .flow_field(FlowField::fixed(0, 2));
    bind_ethertype(descriptor, ETHERTYPE)
}
