use std::fmt;
use std::sync::Arc;

use super::error::LengthError;
use super::field::{BitField, read_field};
use super::registry::{FrozenRegistry, ProtocolId};
use crate::packet::BufferView;

/// Bytes a custom length function needs before it can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub needed: usize,
}

/// Custom length function. Receives the bytes from the header start to the
/// end of the buffer.
pub type LengthFn = Arc<dyn Fn(&[u8]) -> Result<usize, Shortfall> + Send + Sync>;

/// How a protocol's header length is determined.
#[derive(Clone)]
pub enum LengthRule {
    /// Constant length known at registration.
    Fixed(usize),
    /// `value * scale + bias` where `value` is a field of the header itself.
    /// The first `min` bytes must be present before the field is read.
    Field {
        field: BitField,
        scale: usize,
        bias: usize,
        min: usize,
    },
    /// Everything up to the end of the buffer.
    Remaining,
    Custom(LengthFn),
}

impl LengthRule {
    pub const fn field(field: BitField, scale: usize, min: usize) -> Self {
        LengthRule::Field {
            field,
            scale,
            bias: 0,
            min,
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<usize, Shortfall> + Send + Sync + 'static,
    {
        LengthRule::Custom(Arc::new(f))
    }

    pub fn static_length(&self) -> Option<usize> {
        match self {
            LengthRule::Fixed(len) => Some(*len),
            _ => None,
        }
    }

    /// Length of the header of `protocol` starting at `offset`.
    ///
    /// A returned length is never zero and never runs past the buffer.
    pub fn resolve(
        &self,
        protocol: ProtocolId,
        data: &[u8],
        offset: usize,
    ) -> Result<usize, LengthError> {
        let tail = data.get(offset..).unwrap_or(&[]);
        let available = tail.len();
        let truncated = |needed: usize| LengthError::Truncated {
            protocol,
            offset,
            needed,
            available,
        };

        let (length, min) = match self {
            LengthRule::Fixed(len) => {
                if *len > available {
                    return Err(truncated(*len));
                }
                (*len, 1)
            }
            LengthRule::Field {
                field,
                scale,
                bias,
                min,
            } => {
                if available < *min {
                    return Err(truncated(*min));
                }
                let value = read_field(tail, *field)
                    .map_err(|_| truncated(field.containing_bytes().end))?;
                let length = usize::try_from(value)
                    .unwrap_or(usize::MAX)
                    .saturating_mul(*scale)
                    .saturating_add(*bias);
                (length, (*min).max(1))
            }
            LengthRule::Remaining => (available, 1),
            LengthRule::Custom(f) => (f(tail).map_err(|s| truncated(s.needed))?, 1),
        };

        if length < min {
            return Err(LengthError::Malformed {
                protocol,
                offset,
                length,
                min,
            });
        }
        if length > available {
            return Err(LengthError::Overrun {
                protocol,
                offset,
                length,
                available,
            });
        }
        Ok(length)
    }
}

impl fmt::Debug for LengthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthRule::Fixed(len) => write!(f, "Fixed({len})"),
            LengthRule::Field {
                field,
                scale,
                bias,
                min,
            } => f
                .debug_struct("Field")
                .field("field", field)
                .field("scale", scale)
                .field("bias", bias)
                .field("min", min)
                .finish(),
            LengthRule::Remaining => write!(f, "Remaining"),
            LengthRule::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Looks up a protocol's length rule in a frozen registry and applies it.
#[derive(Debug, Clone, Copy)]
pub struct LengthResolver<'r> {
    registry: &'r FrozenRegistry,
}

impl<'r> LengthResolver<'r> {
    pub fn new(registry: &'r FrozenRegistry) -> Self {
        Self { registry }
    }

    pub fn length(
        &self,
        protocol: ProtocolId,
        view: &BufferView<'_>,
        offset: usize,
    ) -> Result<usize, LengthError> {
        let descriptor = self
            .registry
            .lookup(protocol)
            .ok_or(LengthError::Unregistered { protocol, offset })?;
        descriptor.length_rule().resolve(protocol, view.data(), offset)
    }
}
