//! Capture-time fragment reassembly.
//!
//! A sequence moves `Collecting -> Complete | TimedOut`; both terminal states
//! evict it. Time only advances through capture timestamps, via
//! [`FragmentAssembler::insert`] or [`FragmentAssembler::advance_clock`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::debug;

use super::timers::{ProcessingClock, is_expired};
use crate::packet::Timestamp;

#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Idle time after the last fragment before a sequence times out.
    pub window: Duration,
    /// Open sequences per assembler; the earliest deadline is timed out to
    /// make room.
    pub max_sequences: usize,
    /// Keep fragment payloads so complete sequences can be reassembled.
    pub retain_payload: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            max_sequences: 4096,
            retain_payload: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Byte offset inside the reassembled datagram.
    pub offset: usize,
    pub len: usize,
    pub more_fragments: bool,
    pub timestamp: Timestamp,
    pub payload: Option<Bytes>,
}

impl Fragment {
    pub fn new(offset: usize, len: usize, more_fragments: bool, timestamp: Timestamp) -> Self {
        Self {
            offset,
            len,
            more_fragments,
            timestamp,
            payload: None,
        }
    }

    pub fn with_payload(offset: usize, payload: Bytes, more_fragments: bool, timestamp: Timestamp) -> Self {
        Self {
            offset,
            len: payload.len(),
            more_fragments,
            timestamp,
            payload: Some(payload),
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    fn overlaps(&self, other: &Fragment) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    Collecting,
    Complete,
    TimedOut,
}

enum Placement {
    Added,
    Duplicate,
    Overlap,
}

#[derive(Debug, Clone)]
pub struct FragmentSequence<K> {
    key: K,
    fragments: Vec<Fragment>,
    total_len: Option<usize>,
    status: SequenceStatus,
    ambiguous: bool,
    first_fragment_at: Timestamp,
    last_fragment_at: Timestamp,
    serial: u64,
}

impl<K> FragmentSequence<K> {
    fn new(key: K, at: Timestamp, serial: u64) -> Self {
        Self {
            key,
            fragments: Vec::new(),
            total_len: None,
            status: SequenceStatus::Collecting,
            ambiguous: false,
            first_fragment_at: at,
            last_fragment_at: at,
            serial,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Fragments ordered by offset.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Datagram length, known once the final fragment arrived.
    pub fn total_len(&self) -> Option<usize> {
        self.total_len
    }

    pub fn status(&self) -> SequenceStatus {
        self.status
    }

    /// Set when fragments overlapped partially or disagreed on the datagram
    /// length. An ambiguous sequence never completes.
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    pub fn first_fragment_at(&self) -> Timestamp {
        self.first_fragment_at
    }

    pub fn last_fragment_at(&self) -> Timestamp {
        self.last_fragment_at
    }

    pub fn deadline(&self, window: Duration) -> Timestamp {
        self.last_fragment_at.saturating_add(window)
    }

    pub fn received_bytes(&self) -> usize {
        self.fragments.iter().map(|f| f.len).sum()
    }

    /// Concatenated payload of a complete sequence. `None` while collecting,
    /// after a timeout, or when payloads were not retained.
    pub fn reassemble(&self) -> Option<Bytes> {
        if self.status != SequenceStatus::Complete {
            return None;
        }
        let mut out = BytesMut::with_capacity(self.total_len?);
        for fragment in &self.fragments {
            out.extend_from_slice(fragment.payload.as_ref()?);
        }
        Some(out.freeze())
    }

    fn place(&mut self, fragment: Fragment) -> Placement {
        if self
            .fragments
            .iter()
            .any(|f| f.offset == fragment.offset && f.len == fragment.len)
        {
            return Placement::Duplicate;
        }

        let mut placement = Placement::Added;
        if self.fragments.iter().any(|f| f.overlaps(&fragment)) {
            self.ambiguous = true;
            placement = Placement::Overlap;
        }

        if !fragment.more_fragments {
            match self.total_len {
                Some(total) if total != fragment.end() => self.ambiguous = true,
                _ => self.total_len = Some(fragment.end()),
            }
        }
        if self.total_len.is_some_and(|total| fragment.end() > total) {
            self.ambiguous = true;
        }

        self.last_fragment_at = self.last_fragment_at.max(fragment.timestamp);
        let at = self.fragments.partition_point(|f| f.offset <= fragment.offset);
        self.fragments.insert(at, fragment);
        placement
    }

    fn is_covered(&self) -> bool {
        let Some(total) = self.total_len else {
            return false;
        };
        if self.ambiguous {
            return false;
        }
        let mut next = 0;
        for fragment in &self.fragments {
            if fragment.offset != next {
                return false;
            }
            next = fragment.end();
        }
        next == total
    }
}

#[derive(Debug, Clone)]
pub enum AssemblyEvent<K> {
    SequenceStart { key: K, at: Timestamp },
    NewFragment { key: K, offset: usize, len: usize },
    Complete(FragmentSequence<K>),
    Timeout(FragmentSequence<K>),
}

impl<K> AssemblyEvent<K> {
    pub fn key(&self) -> &K {
        match self {
            AssemblyEvent::SequenceStart { key, .. } | AssemblyEvent::NewFragment { key, .. } => key,
            AssemblyEvent::Complete(seq) | AssemblyEvent::Timeout(seq) => seq.key(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyEvent::Complete(_) | AssemblyEvent::Timeout(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub sequences_started: u64,
    pub fragments: u64,
    pub duplicates: u64,
    pub overlaps: u64,
    pub completed: u64,
    pub timed_out: u64,
    /// Timeouts forced by `max_sequences`, included in `timed_out`.
    pub evicted: u64,
    /// Fragments for a key whose sequence was closed within the last window.
    /// Each one opened a new sequence.
    pub late_fragments: u64,
}

impl AssemblerStats {
    fn merge(&mut self, other: &AssemblerStats) {
        self.sequences_started += other.sequences_started;
        self.fragments += other.fragments;
        self.duplicates += other.duplicates;
        self.overlaps += other.overlaps;
        self.completed += other.completed;
        self.timed_out += other.timed_out;
        self.evicted += other.evicted;
        self.late_fragments += other.late_fragments;
    }
}

#[derive(Debug)]
pub struct FragmentAssembler<K> {
    config: AssemblyConfig,
    sequences: HashMap<K, FragmentSequence<K>>,
    /// Open sequences by (last fragment time, serial): earliest deadline
    /// first.
    idle_order: BTreeMap<(Timestamp, u64), K>,
    recently_closed: HashMap<K, Timestamp>,
    /// Close times in clock order, for pruning `recently_closed`.
    closed_order: VecDeque<(Timestamp, K)>,
    clock: ProcessingClock,
    next_serial: u64,
    stats: AssemblerStats,
}

impl<K> FragmentAssembler<K>
where
    K: Clone + Eq + Hash + Debug,
{
    pub fn new(config: AssemblyConfig) -> Self {
        Self {
            config,
            sequences: HashMap::new(),
            idle_order: BTreeMap::new(),
            recently_closed: HashMap::new(),
            closed_order: VecDeque::new(),
            clock: ProcessingClock::new(),
            next_serial: 0,
            stats: AssemblerStats::default(),
        }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn get(&self, key: &K) -> Option<&FragmentSequence<K>> {
        self.sequences.get(key)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Adds a fragment to the sequence of `key`, opening one if needed.
    ///
    /// The fragment's timestamp also drives the clock, so sequences of other
    /// keys may time out in the same call; their events come first.
    pub fn insert(&mut self, key: K, mut fragment: Fragment) -> Vec<AssemblyEvent<K>> {
        let mut events = self.advance_clock(fragment.timestamp);
        if !self.config.retain_payload {
            fragment.payload = None;
        }
        self.stats.fragments += 1;

        if !self.sequences.contains_key(&key) {
            if self.recently_closed.remove(&key).is_some() {
                self.stats.late_fragments += 1;
                debug!(?key, offset = fragment.offset, "fragment for a closed sequence, starting over");
            }
            if self.sequences.len() >= self.config.max_sequences
                && let Some(evicted) = self.evict_earliest_deadline()
            {
                events.push(evicted);
            }
            let sequence = FragmentSequence::new(key.clone(), fragment.timestamp, self.next_serial);
            self.idle_order.insert((fragment.timestamp, self.next_serial), key.clone());
            self.next_serial += 1;
            self.stats.sequences_started += 1;
            events.push(AssemblyEvent::SequenceStart {
                key: key.clone(),
                at: fragment.timestamp,
            });
            self.sequences.insert(key.clone(), sequence);
        }

        let Some(sequence) = self.sequences.get_mut(&key) else {
            return events;
        };
        let (offset, len) = (fragment.offset, fragment.len);
        let idle_since = sequence.last_fragment_at;
        let placement = sequence.place(fragment);
        if sequence.last_fragment_at != idle_since {
            self.idle_order.remove(&(idle_since, sequence.serial));
            self.idle_order
                .insert((sequence.last_fragment_at, sequence.serial), key.clone());
        }
        match placement {
            Placement::Duplicate => {
                self.stats.duplicates += 1;
                debug!(?key, offset, len, "duplicate fragment dropped");
                return events;
            }
            Placement::Overlap => {
                self.stats.overlaps += 1;
                debug!(?key, offset, len, "overlapping fragment, sequence cannot complete");
            }
            Placement::Added => {}
        }
        events.push(AssemblyEvent::NewFragment {
            key: key.clone(),
            offset,
            len,
        });

        if sequence.is_covered()
            && let Some(mut done) = self.sequences.remove(&key)
        {
            done.status = SequenceStatus::Complete;
            self.stats.completed += 1;
            self.idle_order.remove(&(done.last_fragment_at, done.serial));
            self.mark_closed(key);
            events.push(AssemblyEvent::Complete(done));
        }
        events
    }

    /// Moves the capture-time clock to `now` (never backwards) and times out
    /// every sequence idle for longer than the window.
    pub fn advance_clock(&mut self, now: Timestamp) -> Vec<AssemblyEvent<K>> {
        self.clock.observe(now);
        let now = self.clock.now();
        let window = self.config.window;

        while self
            .closed_order
            .front()
            .is_some_and(|(closed_at, _)| is_expired(now, *closed_at, window))
        {
            if let Some((closed_at, key)) = self.closed_order.pop_front()
                && self.recently_closed.get(&key) == Some(&closed_at)
            {
                self.recently_closed.remove(&key);
            }
        }

        let mut events = Vec::new();
        while let Some(entry) = self.idle_order.first_entry() {
            if !is_expired(now, entry.key().0, window) {
                break;
            }
            let key = entry.remove();
            events.extend(self.time_out(&key));
        }
        events
    }

    /// Times out every open sequence, e.g. at the end of a capture.
    pub fn flush(&mut self) -> Vec<AssemblyEvent<K>> {
        let mut open: Vec<_> = self
            .sequences
            .values()
            .map(|seq| (seq.serial, seq.key.clone()))
            .collect();
        open.sort_by_key(|(serial, _)| *serial);
        open.into_iter()
            .filter_map(|(_, key)| self.time_out(&key))
            .collect()
    }

    fn evict_earliest_deadline(&mut self) -> Option<AssemblyEvent<K>> {
        let key = self.idle_order.values().next().cloned()?;
        debug!(?key, max = self.config.max_sequences, "too many open sequences, evicting");
        self.stats.evicted += 1;
        self.time_out(&key)
    }

    fn time_out(&mut self, key: &K) -> Option<AssemblyEvent<K>> {
        let mut sequence = self.sequences.remove(key)?;
        self.idle_order
            .remove(&(sequence.last_fragment_at, sequence.serial));
        sequence.status = SequenceStatus::TimedOut;
        self.stats.timed_out += 1;
        debug!(
            ?key,
            fragments = sequence.fragments.len(),
            last = %sequence.last_fragment_at,
            now = %self.clock.now(),
            "fragment sequence timed out"
        );
        self.mark_closed(key.clone());
        Some(AssemblyEvent::Timeout(sequence))
    }

    fn mark_closed(&mut self, key: K) {
        let now = self.clock.now();
        self.recently_closed.insert(key.clone(), now);
        self.closed_order.push_back((now, key));
    }
}

/// Fragment assembly shared across threads. Each key always maps to the same
/// shard, so its appends and timeouts serialize on one lock.
#[derive(Debug)]
pub struct ShardedAssembler<K> {
    shards: Vec<Mutex<FragmentAssembler<K>>>,
}

impl<K> ShardedAssembler<K>
where
    K: Clone + Eq + Hash + Debug,
{
    /// `config.max_sequences` applies per shard.
    pub fn new(shards: usize, config: AssemblyConfig) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(FragmentAssembler::new(config.clone())))
            .collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &K) -> &Mutex<FragmentAssembler<K>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub fn insert(&self, key: K, fragment: Fragment) -> Vec<AssemblyEvent<K>> {
        self.shard(&key).lock().insert(key, fragment)
    }

    pub fn advance_clock(&self, now: Timestamp) -> Vec<AssemblyEvent<K>> {
        self.shards
            .iter()
            .flat_map(|shard| shard.lock().advance_clock(now))
            .collect()
    }

    pub fn flush(&self) -> Vec<AssemblyEvent<K>> {
        self.shards
            .iter()
            .flat_map(|shard| shard.lock().flush())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> AssemblerStats {
        let mut total = AssemblerStats::default();
        for shard in &self.shards {
            total.merge(&shard.lock().stats());
        }
        total
    }
}
