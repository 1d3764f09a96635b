use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::context::ScanConfig;
use super::registry::{FrozenRegistry, ProtocolId};
use super::scanner::Scanner;
use crate::packet::{Packet, PacketState, Timestamp};
use crate::state::timers::ProcessingClock;
use crate::state::{
    AssemblyConfig, AssemblyEvent, FlowEntry, FlowKey, FlowTable, Ipv4FragmentKey, Ipv4Reassembler,
    Ipv6FragmentKey, Ipv6Reassembler, ipv4_frag, ipv6_frag,
};

#[derive(Debug, Clone)]
pub struct StatefulConfig {
    pub scan: ScanConfig,
    pub enable_flow_table: bool,
    pub max_flows: usize,
    pub flow_idle_timeout: Duration,
    pub enable_ipv4_reassembly: bool,
    pub enable_ipv6_reassembly: bool,
    pub assembly: AssemblyConfig,
}

impl Default for StatefulConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            enable_flow_table: false,
            max_flows: 100_000,
            flow_idle_timeout: Duration::from_secs(120),
            enable_ipv4_reassembly: false,
            enable_ipv6_reassembly: false,
            assembly: AssemblyConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FragmentEvent {
    Ipv4(AssemblyEvent<Ipv4FragmentKey>),
    Ipv6(AssemblyEvent<Ipv6FragmentKey>),
}

impl FragmentEvent {
    pub fn is_terminal(&self) -> bool {
        match self {
            FragmentEvent::Ipv4(event) => event.is_terminal(),
            FragmentEvent::Ipv6(event) => event.is_terminal(),
        }
    }
}

/// Everything learned from one packet.
#[derive(Debug)]
pub struct ProcessedPacket {
    pub state: PacketState,
    pub flow: Option<FlowKey>,
    pub fragments: Vec<FragmentEvent>,
    /// Flows closed by idle timeout or table capacity while handling this
    /// packet.
    pub expired_flows: Vec<(FlowKey, FlowEntry)>,
}

/// Scanner plus the per-capture state that spans packets: flow accounting
/// and IP reassembly, all driven by capture timestamps.
#[derive(Debug)]
pub struct StatefulScanner {
    scanner: Scanner,
    root: ProtocolId,
    clock: ProcessingClock,
    flow_table: Option<FlowTable>,
    ipv4_reassembler: Option<Ipv4Reassembler>,
    ipv6_reassembler: Option<Ipv6Reassembler>,
}

impl StatefulScanner {
    pub fn new(registry: Arc<FrozenRegistry>, root: ProtocolId, config: StatefulConfig) -> Self {
        let flow_table = config
            .enable_flow_table
            .then(|| FlowTable::new(config.max_flows, config.flow_idle_timeout));
        let ipv4_reassembler = config
            .enable_ipv4_reassembly
            .then(|| Ipv4Reassembler::new(config.assembly.clone()));
        let ipv6_reassembler = config
            .enable_ipv6_reassembly
            .then(|| Ipv6Reassembler::new(config.assembly.clone()));

        Self {
            scanner: Scanner::with_config(registry, config.scan),
            root,
            clock: ProcessingClock::new(),
            flow_table,
            ipv4_reassembler,
            ipv6_reassembler,
        }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn process(&mut self, packet: &Packet) -> ProcessedPacket {
        let state = self.scanner.scan_packet(packet, self.root);
        let timestamp = packet.timestamp();
        if !self.clock.observe(timestamp) && timestamp < self.clock.now() {
            debug!(%timestamp, now = %self.clock.now(), "packet timestamp behind processing clock");
        }
        let now = self.clock.now();

        let mut fragments = Vec::new();
        if let Some(reassembler) = self.ipv4_reassembler.as_mut() {
            let events = match ipv4_frag::extract(&state, &packet.data, timestamp) {
                Some((key, fragment)) => reassembler.insert(key, fragment),
                None => reassembler.advance_clock(now),
            };
            fragments.extend(events.into_iter().map(FragmentEvent::Ipv4));
        }
        if let Some(reassembler) = self.ipv6_reassembler.as_mut() {
            let events = match ipv6_frag::extract(&state, &packet.data, timestamp) {
                Some((key, fragment)) => reassembler.insert(key, fragment),
                None => reassembler.advance_clock(now),
            };
            fragments.extend(events.into_iter().map(FragmentEvent::Ipv6));
        }

        let mut flow = None;
        let mut expired_flows = Vec::new();
        if let Some(table) = self.flow_table.as_mut() {
            flow = FlowKey::from_state(self.scanner.registry(), &state, &packet.data);
            if let Some(key) = flow.as_ref() {
                expired_flows.extend(table.upsert(key, now, packet.wire_len()));
            }
            expired_flows.extend(table.expire(now));
        }

        ProcessedPacket {
            state,
            flow,
            fragments,
            expired_flows,
        }
    }

    /// Times out all open fragment sequences, e.g. at the end of a capture.
    pub fn flush(&mut self) -> Vec<FragmentEvent> {
        let mut events = Vec::new();
        if let Some(reassembler) = self.ipv4_reassembler.as_mut() {
            events.extend(reassembler.flush().into_iter().map(FragmentEvent::Ipv4));
        }
        if let Some(reassembler) = self.ipv6_reassembler.as_mut() {
            events.extend(reassembler.flush().into_iter().map(FragmentEvent::Ipv6));
        }
        events
    }

    pub fn flow_table(&self) -> Option<&FlowTable> {
        self.flow_table.as_ref()
    }

    pub fn ipv4_reassembler(&self) -> Option<&Ipv4Reassembler> {
        self.ipv4_reassembler.as_ref()
    }

    pub fn ipv6_reassembler(&self) -> Option<&Ipv6Reassembler> {
        self.ipv6_reassembler.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{FragmentEvent, StatefulConfig, StatefulScanner};
    use crate::engine::constants::protocol_id;
    use crate::layer::builtin_registry;
    use crate::packet::{Packet, PacketMetadata, Timestamp};
    use crate::state::AssemblyEvent;

    fn frame(src_last: u8, dst_last: u8, sport: u16, dport: u16) -> Vec<u8> {
        let mut frame = vec![
            0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 0x08, 0x00, 0x45, 0x00, 0x00, 0x28, 0x12,
            0x34, 0x40, 0x00, 64, 6, 0x00, 0x00, 192, 168, 1, src_last, 192, 168, 1, dst_last,
        ];
        frame.extend_from_slice(&sport.to_be_bytes());
        frame.extend_from_slice(&dport.to_be_bytes());
        frame.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x50, 0x10, 0x10, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ]);
        frame
    }

    fn scanner(config: StatefulConfig) -> StatefulScanner {
        let registry = builtin_registry().expect("builtins");
        StatefulScanner::new(registry, protocol_id::ETHERNET, config)
    }

    #[test]
    fn updates_flow_table_when_enabled() {
        let mut scanner = scanner(StatefulConfig {
            enable_flow_table: true,
            ..StatefulConfig::default()
        });

        let request = Packet::with_timestamp(frame(1, 2, 80, 443), Timestamp::from_secs(1));
        let reply = Packet::with_timestamp(frame(2, 1, 443, 80), Timestamp::from_secs(2));

        let processed = scanner.process(&request);
        assert!(processed.state.has_header(protocol_id::TCP));
        assert!(processed.flow.is_some());
        scanner.process(&reply);

        let table = scanner.flow_table().expect("flow table should be enabled");
        assert_eq!(table.len(), 1);
        let (_, entry) = table.iter().next().expect("one flow");
        assert_eq!(entry.forward.packets, 1);
        assert_eq!(entry.reverse.packets, 1);
    }

    #[test]
    fn flow_bytes_use_wire_length() {
        let mut scanner = scanner(StatefulConfig {
            enable_flow_table: true,
            ..StatefulConfig::default()
        });
        let snapped = Packet {
            data: frame(1, 2, 80, 443),
            metadata: PacketMetadata {
                timestamp: Timestamp::from_secs(1),
                wire_length: Some(1514),
            },
        };
        scanner.process(&snapped);
        scanner.process(&Packet::with_timestamp(frame(2, 1, 443, 80), Timestamp::from_secs(2)));

        let table = scanner.flow_table().expect("flow table should be enabled");
        let (_, entry) = table.iter().next().expect("one flow");
        assert_eq!(entry.forward.bytes, 1514);
        assert_eq!(entry.reverse.bytes, 54);
    }

    #[test]
    fn disabled_features_stay_inert() {
        let mut scanner = scanner(StatefulConfig::default());
        let processed = scanner.process(&Packet::new(frame(1, 2, 80, 443)));

        assert!(processed.flow.is_none());
        assert!(processed.fragments.is_empty());
        assert!(scanner.flow_table().is_none());
        assert!(scanner.ipv4_reassembler().is_none());
    }

    #[test]
    fn unfragmented_traffic_still_advances_reassembly_clock() {
        let mut scanner = scanner(StatefulConfig {
            enable_ipv4_reassembly: true,
            ..StatefulConfig::default()
        });
        scanner.process(&Packet::with_timestamp(frame(1, 2, 80, 443), Timestamp::from_secs(50)));

        assert_eq!(scanner.ipv4_reassembler().map(|r| r.now()), Some(Timestamp::from_secs(50)));
        assert!(scanner.flush().iter().all(|event| !matches!(
            event,
            FragmentEvent::Ipv4(AssemblyEvent::Complete(_))
        )));
    }
}
