pub mod binding;
pub mod constants;
pub mod context;
pub mod error;
pub mod field;
pub mod length;
pub mod registry;
pub mod scanner;
pub mod stateful;

pub use binding::{
    Binding, BindingContext, BindingGraph, BindingOutcome, Predicate, always, field_equals, field_in,
};
pub use context::{MAX_HEADERS, ScanConfig};
pub use error::{FieldError, LengthError, PredicateError, RegistryError, ScanDiagnostic};
pub use field::{BitField, read_field};
pub use length::{LengthFn, LengthResolver, LengthRule, Shortfall};
pub use registry::{FrozenRegistry, PAYLOAD_NAME, ProtocolDescriptor, ProtocolId, ProtocolRegistry};
pub use scanner::Scanner;
pub use stateful::{FragmentEvent, ProcessedPacket, StatefulConfig, StatefulScanner};
