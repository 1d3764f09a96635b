/// Byte order of a multi-byte wire field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Read-only, bounds-checked window over a captured buffer.
///
/// Every read takes an absolute offset and returns `None` instead of
/// panicking when the read would leave the buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    data: &'a [u8],
}

impl<'a> BufferView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self, offset: usize) -> usize {
        self.data.len().saturating_sub(offset)
    }

    pub fn slice(&self, start: usize, len: usize) -> Option<&'a [u8]> {
        let end = start.checked_add(len)?;
        self.data.get(start..end)
    }

    pub fn tail(&self, offset: usize) -> &'a [u8] {
        self.data.get(offset..).unwrap_or(&[])
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    pub fn read_u16(&self, offset: usize, order: ByteOrder) -> Option<u16> {
        let bytes: [u8; 2] = self.slice(offset, 2)?.try_into().ok()?;
        Some(match order {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        })
    }

    pub fn read_u32(&self, offset: usize, order: ByteOrder) -> Option<u32> {
        let bytes: [u8; 4] = self.slice(offset, 4)?.try_into().ok()?;
        Some(match order {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        })
    }

    pub fn read_u64(&self, offset: usize, order: ByteOrder) -> Option<u64> {
        let bytes: [u8; 8] = self.slice(offset, 8)?.try_into().ok()?;
        Some(match order {
            ByteOrder::Big => u64::from_be_bytes(bytes),
            ByteOrder::Little => u64::from_le_bytes(bytes),
        })
    }

    pub fn read_u16_be(&self, offset: usize) -> Option<u16> {
        self.read_u16(offset, ByteOrder::Big)
    }

    pub fn read_u32_be(&self, offset: usize) -> Option<u32> {
        self.read_u32(offset, ByteOrder::Big)
    }
}
