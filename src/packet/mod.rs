pub mod header;
pub mod metadata;
pub mod owned;
pub mod state;
pub mod view;

pub use header::HeaderView;
pub use metadata::{PacketMetadata, Timestamp};
pub use owned::Packet;
pub use state::{HeaderRecord, PacketState, ProtocolSet, Termination};
pub use view::{BufferView, ByteOrder};
