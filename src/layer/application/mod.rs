//! The application layer (Layer 7) modules.

pub mod http;
