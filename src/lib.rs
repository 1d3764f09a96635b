pub mod engine;
pub mod layer;
pub mod packet;
pub mod state;

pub use engine::{
    FrozenRegistry, LengthRule, ProtocolDescriptor, ProtocolId, ProtocolRegistry, RegistryError,
    ScanConfig, Scanner, StatefulConfig, StatefulScanner,
};
pub use layer::{builtin_registry, register_builtins};
pub use packet::{HeaderRecord, HeaderView, Packet, PacketMetadata, PacketState, Termination, Timestamp};
