use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::binding::{Binding, BindingContext, BindingGraph, Predicate};
use super::error::{PredicateError, RegistryError};
use super::length::LengthRule;
use crate::state::flow_key::FlowField;

/// Dense protocol identifier, usable as an index into per-protocol tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolId(u16);

impl ProtocolId {
    /// The catch-all pseudo-protocol for bytes no binding claimed.
    pub const PAYLOAD: ProtocolId = ProtocolId(0);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_payload(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub const PAYLOAD_NAME: &str = "payload";

#[derive(Clone)]
struct BindingDecl {
    target: String,
    priority: i32,
    predicate: Predicate,
}

/// Registration unit for one protocol: its length rule, the protocols its
/// payload may bind to, and the fields it contributes to flow keys.
#[derive(Clone)]
pub struct ProtocolDescriptor {
    requested_id: Option<ProtocolId>,
    name: String,
    nicname: String,
    length: LengthRule,
    bindings: Vec<BindingDecl>,
    flow_fields: Vec<FlowField>,
}

impl ProtocolDescriptor {
    pub fn new(name: impl Into<String>, length: LengthRule) -> Self {
        let name = name.into();
        Self {
            requested_id: None,
            nicname: name.clone(),
            name,
            length,
            bindings: Vec::new(),
            flow_fields: Vec::new(),
        }
    }

    /// Asks for a specific id instead of the next free one.
    pub fn with_id(mut self, id: ProtocolId) -> Self {
        self.requested_id = Some(id);
        self
    }

    pub fn with_nicname(mut self, nicname: impl Into<String>) -> Self {
        self.nicname = nicname.into();
        self
    }

    /// Declares that this protocol's payload is `target` when `predicate`
    /// holds. Priority 0.
    pub fn bind<F>(self, target: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        self.bind_with_priority(target, 0, predicate)
    }

    pub fn bind_with_priority<F>(
        mut self,
        target: impl Into<String>,
        priority: i32,
        predicate: F,
    ) -> Self
    where
        F: Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        self.bindings.push(BindingDecl {
            target: target.into(),
            priority,
            predicate: Arc::new(predicate),
        });
        self
    }

    pub fn flow_field(mut self, field: FlowField) -> Self {
        self.flow_fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nicname(&self) -> &str {
        &self.nicname
    }

    pub fn requested_id(&self) -> Option<ProtocolId> {
        self.requested_id
    }

    pub fn length_rule(&self) -> &LengthRule {
        &self.length
    }

    pub fn flow_fields(&self) -> &[FlowField] {
        &self.flow_fields
    }
}

impl fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("requested_id", &self.requested_id)
            .field("name", &self.name)
            .field("nicname", &self.nicname)
            .field("length", &self.length)
            .field("bindings", &self.bindings.len())
            .field("flow_fields", &self.flow_fields)
            .finish()
    }
}

struct PendingBinding {
    source: String,
    decl: BindingDecl,
}

/// Mutable registration phase. Call [`ProtocolRegistry::freeze`] before
/// scanning.
pub struct ProtocolRegistry {
    protocols: Vec<Option<ProtocolDescriptor>>,
    names: HashMap<String, ProtocolId>,
    pending: Vec<PendingBinding>,
    next_id: u16,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        let payload = ProtocolDescriptor::new(PAYLOAD_NAME, LengthRule::Remaining)
            .with_id(ProtocolId::PAYLOAD);
        let mut names = HashMap::new();
        names.insert(PAYLOAD_NAME.to_string(), ProtocolId::PAYLOAD);

        Self {
            protocols: vec![Some(payload)],
            names,
            pending: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers a protocol and returns its id.
    ///
    /// Registering an already known name returns the existing id; the new
    /// descriptor's bindings are ignored in that case.
    pub fn register(&mut self, mut descriptor: ProtocolDescriptor) -> Result<ProtocolId, RegistryError> {
        if let Some(&existing) = self.names.get(descriptor.name()) {
            return match descriptor.requested_id {
                Some(requested) if requested != existing => Err(RegistryError::NameConflict {
                    name: descriptor.name,
                    existing,
                    requested,
                }),
                _ => {
                    debug!(protocol = %descriptor.name, id = %existing, "protocol already registered");
                    Ok(existing)
                }
            };
        }

        let id = match descriptor.requested_id {
            Some(requested) => {
                if requested.is_payload() {
                    return Err(RegistryError::ReservedId(requested));
                }
                if let Some(Some(other)) = self.protocols.get(requested.index()) {
                    return Err(RegistryError::IdCollision {
                        id: requested,
                        existing: other.name.clone(),
                        requested: descriptor.name,
                    });
                }
                requested
            }
            None => self.allocate()?,
        };

        if self.protocols.len() <= id.index() {
            self.protocols.resize_with(id.index() + 1, || None);
        }
        self.next_id = self.next_id.max(id.raw().saturating_add(1));

        for decl in std::mem::take(&mut descriptor.bindings) {
            self.pending.push(PendingBinding {
                source: descriptor.name.clone(),
                decl,
            });
        }

        debug!(protocol = %descriptor.name, %id, "registered protocol");
        self.names.insert(descriptor.name.clone(), id);
        self.protocols[id.index()] = Some(descriptor);
        Ok(id)
    }

    /// Adds a binding between two protocols by name. Neither endpoint has
    /// to be registered yet; both must be by [`ProtocolRegistry::freeze`].
    pub fn add_binding<F>(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        priority: i32,
        predicate: F,
    ) where
        F: Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        self.pending.push(PendingBinding {
            source: source.into(),
            decl: BindingDecl {
                target: target.into(),
                priority,
                predicate: Arc::new(predicate),
            },
        });
    }

    pub fn lookup(&self, id: ProtocolId) -> Option<&ProtocolDescriptor> {
        self.protocols.get(id.index())?.as_ref()
    }

    pub fn lookup_id(&self, name: &str) -> Option<ProtocolId> {
        lookup_name(&self.names, &self.protocols, name)
    }

    pub fn len(&self) -> usize {
        self.protocols.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves every binding and seals the registry.
    pub fn freeze(self) -> Result<FrozenRegistry, RegistryError> {
        let mut bindings = Vec::with_capacity(self.pending.len());

        for (sequence, pending) in self.pending.into_iter().enumerate() {
            let resolve = |name: &str| lookup_name(&self.names, &self.protocols, name);
            let (Some(source), Some(target)) =
                (resolve(&pending.source), resolve(&pending.decl.target))
            else {
                return Err(RegistryError::UnresolvedBinding {
                    source_name: pending.source,
                    target: pending.decl.target,
                });
            };
            if target.is_payload() {
                return Err(RegistryError::PayloadBinding {
                    source_name: pending.source,
                });
            }

            bindings.push(Binding::new(
                source,
                target,
                pending.decl.priority,
                sequence as u32,
                pending.decl.predicate,
            ));
        }

        let graph = BindingGraph::from_bindings(self.protocols.len(), bindings);
        info!(
            protocols = self.protocols.iter().flatten().count(),
            bindings = graph.len(),
            "protocol registry frozen"
        );

        Ok(FrozenRegistry {
            protocols: self.protocols,
            names: self.names,
            graph,
        })
    }
}

fn lookup_name(
    names: &HashMap<String, ProtocolId>,
    protocols: &[Option<ProtocolDescriptor>],
    name: &str,
) -> Option<ProtocolId> {
    if let Some(id) = names.get(name) {
        return Some(*id);
    }
    protocols
        .iter()
        .enumerate()
        .find_map(|(idx, slot)| match slot {
            Some(desc) if desc.nicname == name => Some(ProtocolId(idx as u16)),
            _ => None,
        })
}

impl ProtocolRegistry {
    fn allocate(&mut self) -> Result<ProtocolId, RegistryError> {
        let mut candidate = self.next_id;
        while matches!(self.protocols.get(candidate as usize), Some(Some(_))) {
            candidate = candidate.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;
        }
        if candidate == u16::MAX {
            return Err(RegistryError::IdSpaceExhausted);
        }
        Ok(ProtocolId(candidate))
    }
}

/// Read-only registry shared by scanners. Only obtainable through
/// [`ProtocolRegistry::freeze`], so every binding endpoint exists.
pub struct FrozenRegistry {
    protocols: Vec<Option<ProtocolDescriptor>>,
    names: HashMap<String, ProtocolId>,
    graph: BindingGraph,
}

impl FrozenRegistry {
    pub fn lookup(&self, id: ProtocolId) -> Option<&ProtocolDescriptor> {
        self.protocols.get(id.index())?.as_ref()
    }

    pub fn lookup_id(&self, name: &str) -> Option<ProtocolId> {
        lookup_name(&self.names, &self.protocols, name)
    }

    pub fn name(&self, id: ProtocolId) -> Option<&str> {
        self.lookup(id).map(ProtocolDescriptor::name)
    }

    pub fn contains(&self, id: ProtocolId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.protocols.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of id slots, including gaps left by explicit ids.
    pub fn id_capacity(&self) -> usize {
        self.protocols.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProtocolId, &ProtocolDescriptor)> {
        self.protocols
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|desc| (ProtocolId(idx as u16), desc)))
    }

    pub fn graph(&self) -> &BindingGraph {
        &self.graph
    }

    pub fn bindings_from(&self, source: ProtocolId) -> &[Binding] {
        self.graph.bindings_from(source)
    }
}

impl fmt::Debug for FrozenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenRegistry")
            .field("protocols", &self.len())
            .field("bindings", &self.graph.len())
            .finish()
    }
}

impl fmt::Display for FrozenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, desc) in self.iter() {
            writeln!(f, "{id} {} ({}) {:?}", desc.name, desc.nicname, desc.length)?;
            for binding in self.bindings_from(id) {
                let target = self.name(binding.target).unwrap_or("?");
                writeln!(
                    f,
                    "    -> {} {target} priority={}",
                    binding.target, binding.priority
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ProtocolDescriptor, ProtocolId, ProtocolRegistry};
    use crate::engine::binding::always;
    use crate::engine::error::RegistryError;
    use crate::engine::length::LengthRule;

    #[test]
    fn payload_is_preregistered() {
        let registry = ProtocolRegistry::new();
        assert_eq!(registry.lookup_id("payload"), Some(ProtocolId::PAYLOAD));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn allocates_monotonic_ids() {
        let mut registry = ProtocolRegistry::new();
        let a = registry
            .register(ProtocolDescriptor::new("a", LengthRule::Fixed(4)))
            .expect("register a");
        let b = registry
            .register(ProtocolDescriptor::new("b", LengthRule::Fixed(4)))
            .expect("register b");
        assert_eq!(a, ProtocolId::new(1));
        assert_eq!(b, ProtocolId::new(2));

        let c = registry
            .register(ProtocolDescriptor::new("c", LengthRule::Fixed(4)).with_id(ProtocolId::new(10)))
            .expect("register c");
        let d = registry
            .register(ProtocolDescriptor::new("d", LengthRule::Fixed(4)))
            .expect("register d");
        assert_eq!(c, ProtocolId::new(10));
        assert_eq!(d, ProtocolId::new(11));
    }

    #[test]
    fn re_registration_is_idempotent() {
        let mut registry = ProtocolRegistry::new();
        let first = registry
            .register(ProtocolDescriptor::new("eth", LengthRule::Fixed(14)))
            .expect("first registration");
        let second = registry
            .register(ProtocolDescriptor::new("eth", LengthRule::Fixed(14)))
            .expect("second registration");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn rejects_id_collision() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(ProtocolDescriptor::new("one", LengthRule::Fixed(1)).with_id(ProtocolId::new(3)))
            .expect("register one");
        let err = registry
            .register(ProtocolDescriptor::new("two", LengthRule::Fixed(1)).with_id(ProtocolId::new(3)))
            .expect_err("id 3 is taken");
        assert!(matches!(err, RegistryError::IdCollision { .. }));

        let err = registry
            .register(ProtocolDescriptor::new("one", LengthRule::Fixed(1)).with_id(ProtocolId::new(4)))
            .expect_err("name bound to another id");
        assert!(matches!(err, RegistryError::NameConflict { .. }));

        let err = registry
            .register(ProtocolDescriptor::new("zero", LengthRule::Fixed(1)).with_id(ProtocolId::PAYLOAD))
            .expect_err("payload id is reserved");
        assert_eq!(err, RegistryError::ReservedId(ProtocolId::PAYLOAD));
    }

    #[test]
    fn lookup_accepts_nicname() {
        let mut registry = ProtocolRegistry::new();
        let id = registry
            .register(ProtocolDescriptor::new("ethernet", LengthRule::Fixed(14)).with_nicname("eth"))
            .expect("register");
        assert_eq!(registry.lookup_id("eth"), Some(id));
        assert_eq!(registry.lookup_id("ethernet"), Some(id));
        assert_eq!(registry.lookup_id("missing"), None);
        assert_eq!(registry.lookup(id).map(|d| d.nicname()), Some("eth"));
    }

    #[test]
    fn bindings_resolve_regardless_of_registration_order() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(ProtocolDescriptor::new("outer", LengthRule::Fixed(2)).bind("inner", always()))
            .expect("register outer");
        registry
            .register(ProtocolDescriptor::new("inner", LengthRule::Fixed(2)))
            .expect("register inner");

        let frozen = registry.freeze().expect("freeze");
        let outer = frozen.lookup_id("outer").expect("outer id");
        let inner = frozen.lookup_id("inner").expect("inner id");
        let edges = frozen.bindings_from(outer);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, inner);
        assert!(frozen.to_string().contains("-> #2 inner"));
    }

    #[test]
    fn freeze_rejects_dangling_binding() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(ProtocolDescriptor::new("outer", LengthRule::Fixed(2)).bind("ghost", always()))
            .expect("register outer");

        let err = registry.freeze().expect_err("ghost is not registered");
        assert_eq!(
            err,
            RegistryError::UnresolvedBinding {
                source_name: "outer".into(),
                target: "ghost".into()
            }
        );
    }

    #[test]
    fn freeze_rejects_binding_to_payload() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(ProtocolDescriptor::new("outer", LengthRule::Fixed(2)))
            .expect("register outer");
        registry.add_binding("outer", "payload", 0, always());

        let err = registry.freeze().expect_err("payload cannot be a target");
        assert!(matches!(err, RegistryError::PayloadBinding { .. }));
    }
}
