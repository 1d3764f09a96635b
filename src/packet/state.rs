use std::ops::Range;

use smallvec::SmallVec;

use super::header::HeaderView;
use crate::engine::error::{LengthError, ScanDiagnostic};
use crate::engine::registry::ProtocolId;

/// One committed header: `protocol` occupies `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderRecord {
    pub protocol: ProtocolId,
    pub offset: usize,
    pub length: usize,
    /// Earlier records of the same protocol in this scan.
    pub instance: u16,
}

impl HeaderRecord {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    pub fn is_payload(&self) -> bool {
        self.protocol.is_payload()
    }
}

/// Bitset over protocol ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolSet {
    words: SmallVec<[u64; 2]>,
}

impl ProtocolSet {
    pub fn insert(&mut self, id: ProtocolId) {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    pub fn contains(&self, id: ProtocolId) -> bool {
        self.words
            .get(id.index() / 64)
            .is_some_and(|word| word & (1 << (id.index() % 64)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Termination {
    /// The last header ended exactly at the end of the buffer, or the buffer
    /// was empty.
    #[default]
    EndOfBuffer,
    /// No binding matched; the rest of the buffer is payload.
    NoBinding,
    /// A header's length could not be placed. Records before it are valid.
    Length(LengthError),
    /// The configured header limit was reached.
    DepthLimit,
    /// The root protocol is not in the registry.
    UnknownRoot(ProtocolId),
}

/// Result of one scan: the headers found, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketState {
    records: SmallVec<[HeaderRecord; 8]>,
    present: ProtocolSet,
    termination: Termination,
    diagnostics: Vec<ScanDiagnostic>,
    buffer_len: usize,
}

impl PacketState {
    pub(crate) fn new(buffer_len: usize) -> Self {
        Self {
            buffer_len,
            ..Self::default()
        }
    }

    /// Appends a record at `offset` and returns it. The caller guarantees the
    /// record is inside the buffer and after the previous one.
    pub(crate) fn push(&mut self, protocol: ProtocolId, offset: usize, length: usize) -> HeaderRecord {
        let instance = u16::try_from(self.instance_count(protocol)).unwrap_or(u16::MAX);
        let record = HeaderRecord {
            protocol,
            offset,
            length,
            instance,
        };
        self.records.push(record);
        self.present.insert(protocol);
        record
    }

    pub(crate) fn finish(&mut self, termination: Termination, diagnostics: Vec<ScanDiagnostic>) {
        self.termination = termination;
        self.diagnostics = diagnostics;
    }

    pub fn has_header(&self, id: ProtocolId) -> bool {
        self.present.contains(id)
    }

    /// The `instance`-th record of `id`, counting from the outermost.
    pub fn header(&self, id: ProtocolId, instance: u16) -> Option<HeaderRecord> {
        if !self.has_header(id) {
            return None;
        }
        self.records
            .iter()
            .find(|record| record.protocol == id && record.instance == instance)
            .copied()
    }

    /// Protocol headers found, not counting the payload record.
    pub fn header_count(&self) -> usize {
        self.records.iter().filter(|record| !record.is_payload()).count()
    }

    pub fn instance_count(&self, id: ProtocolId) -> usize {
        self.records.iter().filter(|record| record.protocol == id).count()
    }

    /// All records in wire order, payload included.
    pub fn iter(&self) -> std::slice::Iter<'_, HeaderRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[HeaderRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn protocols(&self) -> &ProtocolSet {
        &self.present
    }

    /// Innermost protocol header.
    pub fn last_header(&self) -> Option<HeaderRecord> {
        self.records.iter().rev().find(|record| !record.is_payload()).copied()
    }

    pub fn payload(&self) -> Option<HeaderRecord> {
        self.records.last().filter(|record| record.is_payload()).copied()
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn diagnostics(&self) -> &[ScanDiagnostic] {
        &self.diagnostics
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self.termination, Termination::Length(err) if err.is_truncated())
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Typed view over a record. `data` must be the buffer that was scanned.
    pub fn view<'a>(&self, data: &'a [u8], id: ProtocolId, instance: u16) -> Option<HeaderView<'a>> {
        if data.len() != self.buffer_len {
            return None;
        }
        HeaderView::new(data, self.header(id, instance)?)
    }
}

impl<'s> IntoIterator for &'s PacketState {
    type Item = &'s HeaderRecord;
    type IntoIter = std::slice::Iter<'s, HeaderRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{PacketState, ProtocolSet, Termination};
    use crate::engine::error::LengthError;
    use crate::engine::registry::ProtocolId;

    const ETH: ProtocolId = ProtocolId::new(1);
    const VLAN: ProtocolId = ProtocolId::new(2);
    const IP: ProtocolId = ProtocolId::new(4);

    #[test]
    fn protocol_set_tracks_wide_ids() {
        let mut set = ProtocolSet::default();
        assert!(set.is_empty());
        set.insert(ProtocolId::new(3));
        set.insert(ProtocolId::new(130));
        assert!(set.contains(ProtocolId::new(3)));
        assert!(set.contains(ProtocolId::new(130)));
        assert!(!set.contains(ProtocolId::new(64)));
        assert!(!set.contains(ProtocolId::new(1000)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn instances_count_per_protocol() {
        let mut state = PacketState::new(40);
        state.push(ETH, 0, 14);
        state.push(VLAN, 14, 4);
        state.push(VLAN, 18, 4);
        state.push(IP, 22, 10);
        state.push(ProtocolId::PAYLOAD, 32, 8);
        state.finish(Termination::NoBinding, Vec::new());

        assert_eq!(state.header_count(), 4);
        assert_eq!(state.len(), 5);
        assert_eq!(state.instance_count(VLAN), 2);
        assert_eq!(state.header(VLAN, 1).map(|r| r.offset), Some(18));
        assert_eq!(state.header(VLAN, 2), None);
        assert_eq!(state.last_header().map(|r| r.protocol), Some(IP));
        assert_eq!(state.iter().rev().nth(1).map(|r| r.protocol), Some(IP));
        assert_eq!(state.payload().map(|r| r.range()), Some(32..40));
        assert!(!state.has_header(ProtocolId::new(9)));
        assert!(!state.is_truncated());
    }

    #[test]
    fn truncation_is_visible_on_state() {
        let mut state = PacketState::new(20);
        state.push(ETH, 0, 14);
        state.finish(
            Termination::Length(LengthError::Truncated {
                protocol: IP,
                offset: 14,
                needed: 20,
                available: 6,
            }),
            Vec::new(),
        );
        assert!(state.is_truncated());
        assert!(state.payload().is_none());
    }

    #[test]
    fn view_requires_the_scanned_buffer() {
        let data = [0u8; 20];
        let mut state = PacketState::new(data.len());
        state.push(ETH, 0, 14);

        assert!(state.view(&data, ETH, 0).is_some());
        assert!(state.view(&data[..16], ETH, 0).is_none());
        assert!(state.view(&data, IP, 0).is_none());
    }
}
