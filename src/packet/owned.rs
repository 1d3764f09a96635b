use super::metadata::{PacketMetadata, Timestamp};
use super::view::BufferView;

/// A captured packet as handed over by the capture layer.
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Vec<u8>,
    pub metadata: PacketMetadata,
}

impl Packet {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            metadata: PacketMetadata::default(),
        }
    }

    pub fn with_timestamp(data: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            data,
            metadata: PacketMetadata {
                timestamp,
                ..PacketMetadata::default()
            },
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp
    }

    /// Bytes the packet occupied on the wire, falling back to the captured
    /// length when the capture layer did not report it.
    pub fn wire_len(&self) -> usize {
        self.metadata.wire_length.unwrap_or(self.data.len()).max(self.data.len())
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(&self.data)
    }
}
