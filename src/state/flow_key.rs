use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::engine::registry::{FrozenRegistry, ProtocolId};
use crate::packet::{HeaderView, PacketState};

/// Byte range relative to a header start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteSpan {
    pub offset: usize,
    pub len: usize,
}

impl ByteSpan {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }
}

/// Header bytes a protocol contributes to flow keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowField {
    /// Same in both directions, e.g. the IP protocol number.
    Fixed(ByteSpan),
    /// Source/destination pair, swapped when the flow is seen in reverse.
    Reversible { src: ByteSpan, dst: ByteSpan },
}

impl FlowField {
    pub const fn fixed(offset: usize, len: usize) -> Self {
        FlowField::Fixed(ByteSpan::new(offset, len))
    }

    pub const fn reversible(src_offset: usize, dst_offset: usize, len: usize) -> Self {
        FlowField::Reversible {
            src: ByteSpan::new(src_offset, len),
            dst: ByteSpan::new(dst_offset, len),
        }
    }
}

/// Observed direction relative to the canonical orientation of a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FlowDirection {
    #[default]
    Forward,
    Reverse,
}

impl FlowDirection {
    pub fn flip(self) -> Self {
        match self {
            FlowDirection::Forward => FlowDirection::Reverse,
            FlowDirection::Reverse => FlowDirection::Forward,
        }
    }
}

type KeyBytes = SmallVec<[u8; 36]>;

/// Direction-independent flow identity.
///
/// All source-side bytes and all destination-side bytes are compared as one
/// endpoint each and stored lower endpoint first, so a flow and its reverse
/// compare and hash equal. The observed direction is carried along but does
/// not take part in equality.
#[derive(Debug, Clone)]
pub struct FlowKey {
    protocols: SmallVec<[ProtocolId; 4]>,
    fixed: KeyBytes,
    lower: KeyBytes,
    upper: KeyBytes,
    direction: FlowDirection,
}

impl FlowKey {
    pub fn builder() -> FlowKeyBuilder {
        FlowKeyBuilder::default()
    }

    /// Builds a key from the flow fields declared by each header's protocol.
    ///
    /// Returns `None` when no header contributes, or a declared field lies
    /// outside its header.
    pub fn from_state(registry: &FrozenRegistry, state: &PacketState, data: &[u8]) -> Option<Self> {
        let mut builder = FlowKey::builder();
        for record in state.iter().filter(|record| !record.is_payload()) {
            let fields = registry.lookup(record.protocol)?.flow_fields();
            if fields.is_empty() {
                continue;
            }
            let header = HeaderView::new(data, *record)?;
            builder.protocol(record.protocol);
            for field in fields {
                match *field {
                    FlowField::Fixed(span) => {
                        builder.fixed(header.bytes_at(span.offset, span.len).ok()?);
                    }
                    FlowField::Reversible { src, dst } => {
                        builder.pair(
                            header.bytes_at(src.offset, src.len).ok()?,
                            header.bytes_at(dst.offset, dst.len).ok()?,
                        );
                    }
                }
            }
        }
        builder.build()
    }

    pub fn direction(&self) -> FlowDirection {
        self.direction
    }

    pub fn protocols(&self) -> &[ProtocolId] {
        &self.protocols
    }

    /// Observed source endpoint bytes, in field order.
    pub fn source(&self) -> &[u8] {
        match self.direction {
            FlowDirection::Forward => &self.lower,
            FlowDirection::Reverse => &self.upper,
        }
    }

    pub fn destination(&self) -> &[u8] {
        match self.direction {
            FlowDirection::Forward => &self.upper,
            FlowDirection::Reverse => &self.lower,
        }
    }

    pub fn reverse(&self) -> Self {
        Self {
            direction: self.direction.flip(),
            ..self.clone()
        }
    }
}

impl PartialEq for FlowKey {
    fn eq(&self, other: &Self) -> bool {
        self.protocols == other.protocols
            && self.fixed == other.fixed
            && self.lower == other.lower
            && self.upper == other.upper
    }
}

impl Eq for FlowKey {}

impl Hash for FlowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.protocols.hash(state);
        self.fixed.hash(state);
        self.lower.hash(state);
        self.upper.hash(state);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowKeyBuilder {
    protocols: SmallVec<[ProtocolId; 4]>,
    fixed: KeyBytes,
    src: KeyBytes,
    dst: KeyBytes,
}

impl FlowKeyBuilder {
    pub fn protocol(&mut self, id: ProtocolId) -> &mut Self {
        self.protocols.push(id);
        self
    }

    pub fn fixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.fixed.extend_from_slice(bytes);
        self
    }

    pub fn pair(&mut self, src: &[u8], dst: &[u8]) -> &mut Self {
        self.src.extend_from_slice(src);
        self.dst.extend_from_slice(dst);
        self
    }

    pub fn build(&self) -> Option<FlowKey> {
        if self.protocols.is_empty() && self.fixed.is_empty() && self.src.is_empty() {
            return None;
        }
        let (lower, upper, direction) = if self.src <= self.dst {
            (self.src.clone(), self.dst.clone(), FlowDirection::Forward)
        } else {
            (self.dst.clone(), self.src.clone(), FlowDirection::Reverse)
        };
        Some(FlowKey {
            protocols: self.protocols.clone(),
            fixed: self.fixed.clone(),
            lower,
            upper,
            direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use proptest::prelude::*;

    use super::{FlowDirection, FlowKey};
    use crate::engine::registry::ProtocolId;

    fn tuple(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> FlowKey {
        FlowKey::builder()
            .protocol(ProtocolId::new(4))
            .pair(&src, &dst)
            .fixed(&[6])
            .protocol(ProtocolId::new(8))
            .pair(&sport.to_be_bytes(), &dport.to_be_bytes())
            .build()
            .expect("key has fields")
    }

    fn hash_of(key: &FlowKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn both_directions_share_a_key() {
        let forward = tuple([10, 0, 0, 1], [10, 0, 0, 2], 40000, 80);
        let backward = tuple([10, 0, 0, 2], [10, 0, 0, 1], 80, 40000);

        assert_eq!(forward, backward);
        assert_eq!(hash_of(&forward), hash_of(&backward));
        assert_eq!(forward.direction(), FlowDirection::Forward);
        assert_eq!(backward.direction(), FlowDirection::Reverse);
        assert_eq!(backward.source(), &[10, 0, 0, 2, 0, 80]);
    }

    #[test]
    fn ports_are_not_canonicalized_independently() {
        let a = tuple([10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000);
        let b = tuple([10, 0, 0, 1], [10, 0, 0, 2], 2000, 1000);
        assert_ne!(a, b);
    }

    #[test]
    fn ipv6_tunnel_keys_stay_symmetric() {
        let outer = ([0xfd; 16], [0xfe; 16]);
        let inner = ([0x20; 16], [0x21; 16]);
        let build = |swap: bool| {
            let pick = |pair: ([u8; 16], [u8; 16])| if swap { (pair.1, pair.0) } else { pair };
            let (outer_src, outer_dst) = pick(outer);
            let (inner_src, inner_dst) = pick(inner);
            let (sport, dport) = pick_ports(swap);
            FlowKey::builder()
                .protocol(ProtocolId::new(5))
                .pair(&outer_src, &outer_dst)
                .protocol(ProtocolId::new(5))
                .pair(&inner_src, &inner_dst)
                .pair(&sport, &dport)
                .fixed(&[0x5a; 40])
                .build()
                .expect("key")
        };

        let (forward, reverse) = (build(false), build(true));
        assert_eq!(forward.source().len(), 34);
        assert_eq!(forward, reverse);
        assert_eq!(hash_of(&forward), hash_of(&reverse));
        assert_ne!(forward.direction(), reverse.direction());
    }

    fn pick_ports(swap: bool) -> ([u8; 2], [u8; 2]) {
        let (a, b) = (443u16.to_be_bytes(), 50_000u16.to_be_bytes());
        if swap { (b, a) } else { (a, b) }
    }

    #[test]
    fn empty_builder_yields_no_key() {
        assert!(FlowKey::builder().build().is_none());
    }

    proptest! {
        #[test]
        fn reverse_is_symmetric(
            src in any::<[u8; 4]>(),
            dst in any::<[u8; 4]>(),
            sport in any::<u16>(),
            dport in any::<u16>(),
        ) {
            let key = tuple(src, dst, sport, dport);
            let swapped = tuple(dst, src, dport, sport);
            prop_assert_eq!(&key, &key.reverse());
            prop_assert_eq!(&key, &swapped);
            prop_assert_eq!(hash_of(&key), hash_of(&swapped));
            prop_assert_eq!(key.source(), swapped.destination());
        }
    }
}
