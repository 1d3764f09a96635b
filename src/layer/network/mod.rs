//! The network layer (Layer 3) modules.

pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod ipv6_fragment;

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::engine::FieldError;
use crate::packet::HeaderView;

pub(crate) fn ipv4_at(view: &HeaderView<'_>, offset: usize) -> Result<Ipv4Addr, FieldError> {
    let bytes = view.bytes_at(offset, 4)?;
    Ok(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

pub(crate) fn ipv6_at(view: &HeaderView<'_>, offset: usize) -> Result<Ipv6Addr, FieldError> {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(view.bytes_at(offset, 16)?);
    Ok(Ipv6Addr::from(octets))
}

/// Ones' complement sum over `bytes`, as used by the IPv4 and ICMP
/// checksums. A correct header sums to `0xffff`.
pub fn ones_complement_sum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}
