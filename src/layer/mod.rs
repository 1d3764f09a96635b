//! Built-in protocol modules. Each module exposes its name, pinned id,
//! field layout, a `descriptor()` registration unit and typed accessors over
//! a [`HeaderView`](crate::packet::HeaderView).

use std::sync::Arc;

use crate::engine::{FrozenRegistry, ProtocolRegistry, RegistryError};

pub mod application; // Layer 7 - HTTP
pub mod datalink; // Layer 2 - Ethernet, VLAN, ARP
pub mod network; // Layer 3 - IPv4, IPv6, ICMP
pub mod transport; // Layer 4 - TCP/UDP

use application::http;
use datalink::{arp, ethernet, vlan};
use network::{icmp, ipv4, ipv6, ipv6_fragment};
use transport::{tcp, udp};

/// Registers every built-in protocol and their bindings.
pub fn register_builtins(registry: &mut ProtocolRegistry) -> Result<(), RegistryError> {
    for descriptor in [
        ethernet::descriptor(),
        vlan::descriptor(),
        arp::descriptor(),
        ipv4::descriptor(),
        ipv6::descriptor(),
        ipv6_fragment::descriptor(),
        icmp::descriptor(),
        tcp::descriptor(),
        udp::descriptor(),
        http::descriptor(),
    ] {
        registry.register(descriptor)?;
    }
    registry.add_binding(tcp::NAME, http::NAME, 0, http::detect);
    Ok(())
}

/// A frozen registry holding only the built-in protocols.
pub fn builtin_registry() -> Result<Arc<FrozenRegistry>, RegistryError> {
    let mut registry = ProtocolRegistry::new();
    register_builtins(&mut registry)?;
    Ok(Arc::new(registry.freeze()?))
}
