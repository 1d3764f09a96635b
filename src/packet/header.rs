use crate::engine::error::FieldError;
use crate::engine::field::{BitField, read_field};

use super::state::HeaderRecord;

/// Typed reader over one committed header.
///
/// Offsets passed to the `*_at` accessors are relative to the header start;
/// reads never leave the header's window.
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a> {
    data: &'a [u8],
    record: HeaderRecord,
}

impl<'a> HeaderView<'a> {
    /// Fails when `record` does not fit inside `data`.
    pub fn new(data: &'a [u8], record: HeaderRecord) -> Option<Self> {
        (record.end() <= data.len()).then_some(Self { data, record })
    }

    pub(crate) fn from_parts(data: &'a [u8], record: HeaderRecord) -> Self {
        Self { data, record }
    }

    pub fn record(&self) -> HeaderRecord {
        self.record
    }

    pub fn len(&self) -> usize {
        self.record.length
    }

    pub fn is_empty(&self) -> bool {
        self.record.length == 0
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data.get(self.record.range()).unwrap_or(&[])
    }

    /// Everything after the header.
    pub fn payload(&self) -> &'a [u8] {
        self.data.get(self.record.end()..).unwrap_or(&[])
    }

    pub fn field(&self, field: BitField) -> Result<u64, FieldError> {
        read_field(self.bytes(), field)
    }

    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(offset).copied()
    }

    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let raw = self.bytes_at(offset, 2).ok()?;
        Some(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        let raw = self.bytes_at(offset, 4).ok()?;
        Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8], FieldError> {
        let bytes = self.bytes();
        offset
            .checked_add(len)
            .and_then(|end| bytes.get(offset..end))
            .ok_or(FieldError::OutOfBounds {
                bit_offset: offset.saturating_mul(8),
                bit_length: u8::try_from(len.saturating_mul(8)).unwrap_or(u8::MAX),
                available: bytes.len(),
            })
    }
}
