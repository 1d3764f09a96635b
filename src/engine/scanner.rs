use std::sync::Arc;

use tracing::{debug, trace};

use super::binding::BindingContext;
use super::context::ScanConfig;
use super::error::ScanDiagnostic;
use super::length::LengthResolver;
use super::registry::{FrozenRegistry, ProtocolId};
use crate::packet::{BufferView, HeaderRecord, Packet, PacketState, Termination};

enum Step {
    Probing { protocol: ProtocolId, offset: usize },
    Committed(HeaderRecord),
    Stopped(Termination),
}

/// Walks the header chain of a buffer against a frozen registry.
///
/// Holds no per-scan state: scanning the same buffer twice yields equal
/// [`PacketState`]s, and one scanner can be shared across threads.
#[derive(Debug, Clone)]
pub struct Scanner {
    registry: Arc<FrozenRegistry>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(registry: Arc<FrozenRegistry>) -> Self {
        Self::with_config(registry, ScanConfig::default())
    }

    pub fn with_config(registry: Arc<FrozenRegistry>, config: ScanConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<FrozenRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn scan_packet(&self, packet: &Packet, root: ProtocolId) -> PacketState {
        self.scan_view(&packet.view(), root)
    }

    pub fn scan(&self, data: &[u8], root: ProtocolId) -> PacketState {
        self.scan_view(&BufferView::new(data), root)
    }

    /// Dissects `view` starting with a `root` header at offset 0.
    ///
    /// Malformed input never fails the scan; the reason dissection stopped is
    /// reported by [`PacketState::termination`].
    pub fn scan_view(&self, view: &BufferView<'_>, root: ProtocolId) -> PacketState {
        let data = view.data();
        let mut state = PacketState::new(data.len());
        let mut diagnostics = Vec::new();

        if !self.registry.contains(root) || root.is_payload() {
            debug!(%root, "scan root is not a registered protocol");
            state.finish(Termination::UnknownRoot(root), diagnostics);
            return state;
        }
        if data.is_empty() {
            state.finish(Termination::EndOfBuffer, diagnostics);
            return state;
        }

        let resolver = LengthResolver::new(&self.registry);
        let mut step = Step::Probing {
            protocol: root,
            offset: 0,
        };

        let termination = loop {
            step = match step {
                Step::Probing { protocol, offset } => {
                    if state.header_count() >= self.config.header_limit() {
                        debug!(max = self.config.header_limit(), offset, "header limit reached");
                        self.push_payload(&mut state, offset, data.len());
                        Step::Stopped(Termination::DepthLimit)
                    } else {
                        match resolver.length(protocol, view, offset) {
                            Ok(length) => Step::Committed(state.push(protocol, offset, length)),
                            Err(err) => {
                                debug!(%err, "header length unresolved, stopping scan");
                                Step::Stopped(Termination::Length(err))
                            }
                        }
                    }
                }
                Step::Committed(record) => {
                    trace!(
                        protocol = %record.protocol,
                        offset = record.offset,
                        length = record.length,
                        instance = record.instance,
                        "header committed"
                    );
                    self.advance(&state, data, record, &mut diagnostics)
                }
                Step::Stopped(termination) => break termination,
            };
        };

        if termination == Termination::NoBinding
            && let Some(last) = state.last_header()
        {
            self.push_payload(&mut state, last.end(), data.len());
        }
        state.finish(termination, diagnostics);
        state
    }

    fn advance(
        &self,
        state: &PacketState,
        data: &[u8],
        record: HeaderRecord,
        diagnostics: &mut Vec<ScanDiagnostic>,
    ) -> Step {
        if record.end() >= data.len() {
            return Step::Stopped(Termination::EndOfBuffer);
        }
        let Some(ctx) = BindingContext::new(data, state.records()) else {
            return Step::Stopped(Termination::EndOfBuffer);
        };
        match self.registry.graph().resolve_next(&ctx, diagnostics) {
            Some(next) => Step::Probing {
                protocol: next,
                offset: record.end(),
            },
            None => Step::Stopped(Termination::NoBinding),
        }
    }

    fn push_payload(&self, state: &mut PacketState, offset: usize, end: usize) {
        if self.config.emit_payload && offset < end {
            state.push(ProtocolId::PAYLOAD, offset, end - offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Scanner;
    use crate::engine::binding::{BindingContext, always, field_equals};
    use crate::engine::context::ScanConfig;
    use crate::engine::error::{LengthError, PredicateError, ScanDiagnostic};
    use crate::engine::field::BitField;
    use crate::engine::length::LengthRule;
    use crate::engine::registry::{FrozenRegistry, ProtocolDescriptor, ProtocolId, ProtocolRegistry};
    use crate::packet::Termination;

    const NEXT: BitField = BitField::bytes(0, 1);

    /// `outer` (2 bytes, first byte selects `inner`) -> `inner` (length byte).
    fn registry() -> Arc<FrozenRegistry> {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(
                ProtocolDescriptor::new("outer", LengthRule::Fixed(2))
                    .bind("inner", field_equals(NEXT, 1))
                    .bind("outer", field_equals(NEXT, 2)),
            )
            .expect("register outer");
        registry
            .register(ProtocolDescriptor::new("inner", LengthRule::field(BitField::bytes(0, 1), 1, 1)))
            .expect("register inner");
        Arc::new(registry.freeze().expect("freeze"))
    }

    fn id(registry: &FrozenRegistry, name: &str) -> ProtocolId {
        registry.lookup_id(name).expect("registered")
    }

    #[test]
    fn walks_chain_and_emits_payload() {
        let registry = registry();
        let (outer, inner) = (id(&registry, "outer"), id(&registry, "inner"));
        let scanner = Scanner::new(Arc::clone(&registry));

        let data = [1, 0, 3, 0xaa, 0xbb, 0xcc, 0xdd];
        let state = scanner.scan(&data, outer);

        let spans: Vec<_> = state.iter().map(|r| (r.protocol, r.offset, r.length)).collect();
        assert_eq!(
            spans,
            [(outer, 0, 2), (inner, 2, 3), (ProtocolId::PAYLOAD, 5, 2)]
        );
        assert_eq!(state.termination(), Termination::NoBinding);
        assert_eq!(state.header_count(), 2);
    }

    #[test]
    fn header_ending_at_buffer_end_stops_cleanly() {
        let registry = registry();
        let scanner = Scanner::new(Arc::clone(&registry));
        let state = scanner.scan(&[1, 0, 2, 0xaa], id(&registry, "outer"));

        assert_eq!(state.len(), 2);
        assert!(state.payload().is_none());
        assert_eq!(state.termination(), Termination::EndOfBuffer);
    }

    #[test]
    fn length_failure_keeps_earlier_records() {
        let registry = registry();
        let inner = id(&registry, "inner");
        let scanner = Scanner::new(Arc::clone(&registry));
        let state = scanner.scan(&[1, 0, 9, 0xaa], id(&registry, "outer"));

        assert_eq!(state.len(), 1);
        assert_eq!(
            state.termination(),
            Termination::Length(LengthError::Overrun {
                protocol: inner,
                offset: 2,
                length: 9,
                available: 2
            })
        );
        assert!(!state.is_truncated());
    }

    #[test]
    fn repeated_protocol_counts_instances() {
        let registry = registry();
        let outer = id(&registry, "outer");
        let scanner = Scanner::new(Arc::clone(&registry));
        let state = scanner.scan(&[2, 0, 2, 0, 1, 0, 1], outer);

        assert_eq!(state.instance_count(outer), 3);
        assert_eq!(state.header(outer, 2).map(|r| r.offset), Some(4));
        assert_eq!(state.termination(), Termination::EndOfBuffer);
    }

    #[test]
    fn depth_limit_turns_remainder_into_payload() {
        let registry = registry();
        let outer = id(&registry, "outer");
        let scanner = Scanner::with_config(
            Arc::clone(&registry),
            ScanConfig {
                max_headers: 2,
                ..ScanConfig::default()
            },
        );
        let state = scanner.scan(&[2, 0, 2, 0, 2, 0], outer);

        assert_eq!(state.header_count(), 2);
        assert_eq!(state.payload().map(|r| r.range()), Some(4..6));
        assert_eq!(state.termination(), Termination::DepthLimit);
    }

    #[test]
    fn payload_record_can_be_disabled() {
        let registry = registry();
        let scanner = Scanner::with_config(
            Arc::clone(&registry),
            ScanConfig {
                emit_payload: false,
                ..ScanConfig::default()
            },
        );
        let state = scanner.scan(&[7, 0, 0xaa], id(&registry, "outer"));
        assert_eq!(state.len(), 1);
        assert_eq!(state.termination(), Termination::NoBinding);
    }

    #[test]
    fn empty_buffer_and_unknown_root() {
        let registry = registry();
        let scanner = Scanner::new(Arc::clone(&registry));

        let empty = scanner.scan(&[], id(&registry, "outer"));
        assert!(empty.is_empty());
        assert_eq!(empty.termination(), Termination::EndOfBuffer);

        let unknown = ProtocolId::new(99);
        let state = scanner.scan(&[1, 2, 3], unknown);
        assert!(state.is_empty());
        assert_eq!(state.termination(), Termination::UnknownRoot(unknown));
    }

    #[test]
    fn predicate_faults_surface_as_diagnostics() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(
                ProtocolDescriptor::new("outer", LengthRule::Fixed(1))
                    .bind_with_priority("inner", 1, |ctx: &BindingContext<'_>| {
                        Ok(ctx.field(BitField::bytes(4, 1))? == 0)
                    })
                    .bind("tail", always()),
            )
            .expect("register outer");
        registry
            .register(ProtocolDescriptor::new("inner", LengthRule::Fixed(1)))
            .expect("register inner");
        registry
            .register(ProtocolDescriptor::new("tail", LengthRule::Remaining))
            .expect("register tail");
        let registry = Arc::new(registry.freeze().expect("freeze"));
        let scanner = Scanner::new(Arc::clone(&registry));

        let state = scanner.scan(&[0, 1, 2], id(&registry, "outer"));
        assert_eq!(state.last_header().map(|r| r.protocol), Some(id(&registry, "tail")));
        assert!(matches!(
            state.diagnostics(),
            [ScanDiagnostic::PredicateFault { error: PredicateError::Field(_), offset: 0, .. }]
        ));
    }

    #[test]
    fn scans_are_deterministic() {
        let registry = registry();
        let scanner = Scanner::new(Arc::clone(&registry));
        let data = [2, 0, 1, 0, 4, 0xaa, 0xbb, 0xcc, 0xdd, 0xee];
        let outer = id(&registry, "outer");
        assert_eq!(scanner.scan(&data, outer), scanner.scan(&data, outer));
    }
}
