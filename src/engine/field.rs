//! Declared bit-offset/bit-length → value extraction.
//!
//! Bit numbering is network order: bit 0 is the most significant bit of the
//! first byte of the window. Little-endian fields must be byte aligned.

use std::ops::Range;

use super::error::FieldError;
use crate::packet::ByteOrder;

/// Location of a field inside a header, relative to the header start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    pub bit_offset: usize,
    pub bit_length: u8,
    pub order: ByteOrder,
}

impl BitField {
    pub const fn new(bit_offset: usize, bit_length: u8) -> Self {
        Self {
            bit_offset,
            bit_length,
            order: ByteOrder::Big,
        }
    }

    /// Byte-aligned field of `len` bytes (at most 8).
    pub const fn bytes(byte_offset: usize, len: u8) -> Self {
        Self::new(byte_offset * 8, len * 8)
    }

    pub const fn little_endian(mut self) -> Self {
        self.order = ByteOrder::Little;
        self
    }

    pub const fn end_bit(&self) -> usize {
        self.bit_offset + self.bit_length as usize
    }

    /// Bytes that must be present to read the field.
    pub const fn containing_bytes(&self) -> Range<usize> {
        self.bit_offset / 8..self.end_bit().div_ceil(8)
    }
}

/// Reads `field` from `window`, which starts at the header's first byte.
pub fn read_field(window: &[u8], field: BitField) -> Result<u64, FieldError> {
    if field.bit_length == 0 || field.bit_length > 64 {
        return Err(FieldError::InvalidWidth(field.bit_length));
    }

    let range = field.containing_bytes();
    let bytes = window
        .get(range.clone())
        .ok_or(FieldError::OutOfBounds {
            bit_offset: field.bit_offset,
            bit_length: field.bit_length,
            available: window.len(),
        })?;

    match field.order {
        ByteOrder::Big => {
            // At most 9 bytes: 7 leading bits of slack plus 64 value bits.
            let mut lane = [0u8; 16];
            lane[16 - bytes.len()..].copy_from_slice(bytes);
            let value = u128::from_be_bytes(lane);

            let trailing = range.end * 8 - field.end_bit();
            let mask = (1u128 << field.bit_length) - 1;
            Ok(((value >> trailing) & mask) as u64)
        }
        ByteOrder::Little => {
            if field.bit_offset % 8 != 0 || field.bit_length % 8 != 0 {
                return Err(FieldError::UnalignedLittleEndian {
                    bit_offset: field.bit_offset,
                    bit_length: field.bit_length,
                });
            }
            let mut lane = [0u8; 8];
            lane[..bytes.len()].copy_from_slice(bytes);
            Ok(u64::from_le_bytes(lane))
        }
    }
}
