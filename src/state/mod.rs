pub mod flow_key;
pub mod flow_table;
pub mod fragment;
pub mod ipv4_frag;
pub mod ipv6_frag;
pub mod timers;

pub use flow_key::{ByteSpan, FlowDirection, FlowField, FlowKey, FlowKeyBuilder};
pub use flow_table::{DirectionStats, FlowEntry, FlowTable};
pub use fragment::{
    AssemblerStats, AssemblyConfig, AssemblyEvent, Fragment, FragmentAssembler, FragmentSequence,
    SequenceStatus, ShardedAssembler,
};
pub use ipv4_frag::{Ipv4FragmentKey, Ipv4Reassembler};
pub use ipv6_frag::{Ipv6FragmentKey, Ipv6Reassembler};
pub use timers::{ProcessingClock, is_expired};
