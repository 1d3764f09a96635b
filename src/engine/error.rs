use thiserror::Error;

use super::registry::ProtocolId;

/// Registry misconfiguration. Raised while registering or at freeze, never
/// while scanning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("protocol id {id} already belongs to `{existing}`, cannot register `{requested}`")]
    IdCollision {
        id: ProtocolId,
        existing: String,
        requested: String,
    },

    #[error("protocol `{name}` is registered as {existing}, re-registration asked for {requested}")]
    NameConflict {
        name: String,
        existing: ProtocolId,
        requested: ProtocolId,
    },

    #[error("binding `{source_name}` -> `{target}` references an unregistered protocol")]
    UnresolvedBinding { source_name: String, target: String },

    #[error("binding from `{source_name}` targets the payload pseudo-protocol")]
    PayloadBinding { source_name: String },

    #[error("protocol id {0} is reserved")]
    ReservedId(ProtocolId),

    #[error("protocol id space exhausted")]
    IdSpaceExhausted,
}

/// Failure to place a header. Recovered inside the scanner: dissection
/// stops early and the records collected so far stay valid.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthError {
    #[error("{protocol}: truncated header at offset {offset} (need {needed} bytes, have {available})")]
    Truncated {
        protocol: ProtocolId,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{protocol}: header length {length} at offset {offset} overruns buffer ({available} bytes left)")]
    Overrun {
        protocol: ProtocolId,
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("{protocol}: invalid header length {length} at offset {offset} (minimum {min})")]
    Malformed {
        protocol: ProtocolId,
        offset: usize,
        length: usize,
        min: usize,
    },

    #[error("{protocol}: not registered (offset {offset})")]
    Unregistered { protocol: ProtocolId, offset: usize },
}

impl LengthError {
    pub fn protocol(&self) -> ProtocolId {
        match self {
            LengthError::Truncated { protocol, .. }
            | LengthError::Overrun { protocol, .. }
            | LengthError::Malformed { protocol, .. }
            | LengthError::Unregistered { protocol, .. } => *protocol,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, LengthError::Truncated { .. })
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    #[error("field bits {bit_offset}+{bit_length} outside a {available}-byte window")]
    OutOfBounds {
        bit_offset: usize,
        bit_length: u8,
        available: usize,
    },

    #[error("field width {0} bits is not in 1..=64")]
    InvalidWidth(u8),

    #[error("little-endian field at bit {bit_offset} (width {bit_length}) is not byte aligned")]
    UnalignedLittleEndian { bit_offset: usize, bit_length: u8 },
}

/// Error returned by a binding predicate. Indicates a defect in a protocol
/// module rather than malformed input; the binding is treated as not taken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("{0}")]
    Failed(String),
}

/// Non-fatal observation made while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDiagnostic {
    PredicateFault {
        source: ProtocolId,
        target: ProtocolId,
        offset: usize,
        error: PredicateError,
    },
}
