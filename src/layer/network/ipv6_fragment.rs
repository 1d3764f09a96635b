use crate::engine::constants::{ip_proto, protocol_id};
use crate::engine::{
    BindingContext, BitField, FieldError, LengthRule, PredicateError, ProtocolDescriptor, ProtocolId,
};
use crate::layer::transport::{tcp, udp};
use crate::packet::HeaderView;

pub const NAME: &str = "ipv6-fragment";
pub const ID: ProtocolId = protocol_id::IPV6_FRAGMENT;
pub const HEADER_LEN: usize = 8;

pub const NEXT_HEADER: BitField = BitField::bytes(0, 1);
/// In units of 8 bytes.
pub const FRAGMENT_OFFSET: BitField = BitField::new(16, 13);
pub const MORE_FRAGMENTS: BitField = BitField::new(31, 1);
pub const IDENTIFICATION: BitField = BitField::bytes(4, 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub next_header: u8,
    pub fragment_offset: u16,
    pub more_fragments: bool,
    pub identification: u32,
}

impl FragmentHeader {
    pub fn from_view(view: &HeaderView<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            next_header: view.field(NEXT_HEADER)? as u8,
            fragment_offset: view.field(FRAGMENT_OFFSET)? as u16,
            more_fragments: view.field(MORE_FRAGMENTS)? == 1,
            identification: view.field(IDENTIFICATION)? as u32,
        })
    }

    pub fn fragment_offset_bytes(&self) -> usize {
        usize::from(self.fragment_offset) * 8
    }
}

fn carries(protocol: u8) -> impl Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static {
    move |ctx: &BindingContext<'_>| {
        Ok(ctx.field(NEXT_HEADER)? == u64::from(protocol) && ctx.field(FRAGMENT_OFFSET)? == 0)
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::Fixed(HEADER_LEN))
        .with_id(ID)
        .with_nicname("ip6frag")
        .bind(tcp::NAME, carries(ip_proto::TCP))
        .bind(udp::NAME, carries(ip_proto::UDP))
}
