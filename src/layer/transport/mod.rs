//! The transport layer (Layer 4) modules.

pub mod tcp;
pub mod udp;

use crate::engine::{BitField, FieldError};
use crate::packet::HeaderView;

pub const SOURCE_PORT: BitField = BitField::bytes(0, 2);
pub const DESTINATION_PORT: BitField = BitField::bytes(2, 2);

/// `(source, destination)` ports; TCP and UDP share the layout.
pub fn ports(view: &HeaderView<'_>) -> Result<(u16, u16), FieldError> {
    Ok((
        view.field(SOURCE_PORT)? as u16,
        view.field(DESTINATION_PORT)? as u16,
    ))
}
