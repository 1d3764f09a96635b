use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::error::{FieldError, PredicateError, ScanDiagnostic};
use super::field::BitField;
use super::registry::ProtocolId;
use crate::packet::{HeaderRecord, HeaderView};

/// Binding predicate. Only receives shared borrows, so it cannot mutate the
/// buffer or the scan state.
pub type Predicate = Arc<dyn Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync>;

/// What a predicate sees: the buffer, the header just committed, and every
/// header committed before it in this scan.
#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    data: &'a [u8],
    headers: &'a [HeaderRecord],
    current: HeaderRecord,
}

impl<'a> BindingContext<'a> {
    /// `headers` must end with the header whose successor is being resolved.
    pub fn new(data: &'a [u8], headers: &'a [HeaderRecord]) -> Option<Self> {
        let current = *headers.last()?;
        if current.end() > data.len() {
            return None;
        }
        Some(Self {
            data,
            headers,
            current,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn current(&self) -> HeaderRecord {
        self.current
    }

    pub fn headers(&self) -> &'a [HeaderRecord] {
        self.headers
    }

    pub fn header(&self) -> HeaderView<'a> {
        HeaderView::from_parts(self.data, self.current)
    }

    /// Reads a field of the current header.
    pub fn field(&self, field: BitField) -> Result<u64, FieldError> {
        self.header().field(field)
    }

    /// Bytes following the current header.
    pub fn payload(&self) -> &'a [u8] {
        self.data.get(self.current.end()..).unwrap_or(&[])
    }

    /// Instances of `protocol` committed so far, the current header included.
    pub fn instance_count(&self, protocol: ProtocolId) -> usize {
        self.headers
            .iter()
            .filter(|record| record.protocol == protocol)
            .count()
    }
}

/// A resolved edge `source -> target`.
#[derive(Clone)]
pub struct Binding {
    pub source: ProtocolId,
    pub target: ProtocolId,
    pub priority: i32,
    /// Registration order, breaks priority ties.
    pub sequence: u32,
    predicate: Predicate,
}

impl Binding {
    pub(crate) fn new(
        source: ProtocolId,
        target: ProtocolId,
        priority: i32,
        sequence: u32,
        predicate: Predicate,
    ) -> Self {
        Self {
            source,
            target,
            priority,
            sequence,
            predicate,
        }
    }

    pub fn evaluate(&self, ctx: &BindingContext<'_>) -> Result<bool, PredicateError> {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Result of evaluating one candidate without short-circuiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingOutcome {
    pub target: ProtocolId,
    pub priority: i32,
    pub result: Result<bool, PredicateError>,
}

/// Directed edges between protocols, indexed by source id.
///
/// Each source's edges are kept in resolution order: priority descending,
/// then registration sequence ascending.
#[derive(Debug, Clone, Default)]
pub struct BindingGraph {
    edges: Vec<Vec<Binding>>,
    count: usize,
}

impl BindingGraph {
    pub(crate) fn from_bindings(slots: usize, bindings: Vec<Binding>) -> Self {
        let mut edges: Vec<Vec<Binding>> = vec![Vec::new(); slots];
        let count = bindings.len();
        for binding in bindings {
            if let Some(list) = edges.get_mut(binding.source.index()) {
                list.push(binding);
            }
        }
        for list in &mut edges {
            list.sort_by_key(|b| (Reverse(b.priority), b.sequence));
        }
        Self { edges, count }
    }

    pub fn bindings_from(&self, source: ProtocolId) -> &[Binding] {
        self.edges
            .get(source.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// First target whose predicate holds for the current header, or `None`
    /// when the rest of the buffer is opaque payload.
    ///
    /// Predicate errors count as "no match" and are reported through
    /// `diagnostics`.
    pub fn resolve_next(
        &self,
        ctx: &BindingContext<'_>,
        diagnostics: &mut Vec<ScanDiagnostic>,
    ) -> Option<ProtocolId> {
        let current = ctx.current();
        for binding in self.bindings_from(current.protocol) {
            match binding.evaluate(ctx) {
                Ok(true) => return Some(binding.target),
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        source = %binding.source,
                        target = %binding.target,
                        offset = current.offset,
                        %error,
                        "binding predicate failed, treating as no match"
                    );
                    diagnostics.push(ScanDiagnostic::PredicateFault {
                        source: binding.source,
                        target: binding.target,
                        offset: current.offset,
                        error,
                    });
                }
            }
        }
        None
    }

    /// Evaluates every candidate of the current header, in resolution order.
    pub fn evaluate_all(&self, ctx: &BindingContext<'_>) -> Vec<BindingOutcome> {
        self.bindings_from(ctx.current().protocol)
            .iter()
            .map(|binding| BindingOutcome {
                target: binding.target,
                priority: binding.priority,
                result: binding.evaluate(ctx),
            })
            .collect()
    }
}

pub fn always() -> impl Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static
{
    |_: &BindingContext<'_>| Ok(true)
}

/// Holds when `field` of the current header equals `value`.
pub fn field_equals(
    field: BitField,
    value: u64,
) -> impl Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static {
    move |ctx: &BindingContext<'_>| Ok(ctx.field(field)? == value)
}

pub fn field_in(
    field: BitField,
    values: &'static [u64],
) -> impl Fn(&BindingContext<'_>) -> Result<bool, PredicateError> + Send + Sync + 'static {
    move |ctx: &BindingContext<'_>| {
        let value = ctx.field(field)?;
        Ok(values.contains(&value))
    }
}
