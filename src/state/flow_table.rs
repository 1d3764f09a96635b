use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::debug;

use super::flow_key::{FlowDirection, FlowKey};
use super::timers::is_expired;
use crate::packet::Timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub packets: u64,
    pub bytes: u64,
}

impl DirectionStats {
    fn record(&mut self, bytes: usize) {
        self.packets += 1;
        self.bytes += bytes as u64;
    }
}

#[derive(Debug, Clone)]
pub struct FlowEntry {
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    /// Direction of the packet that opened the flow.
    pub initiator: FlowDirection,
    /// Packets travelling the same way as the initiator.
    pub forward: DirectionStats,
    pub reverse: DirectionStats,
}

impl FlowEntry {
    pub fn packet_count(&self) -> u64 {
        self.forward.packets + self.reverse.packets
    }

    pub fn byte_count(&self) -> u64 {
        self.forward.bytes + self.reverse.bytes
    }
}

#[derive(Debug)]
struct Slot {
    entry: FlowEntry,
    serial: u64,
}

/// Bidirectional flow accounting keyed by [`FlowKey`].
///
/// Flows are also indexed by (last seen, serial), so expiry and eviction
/// touch only the stale end of the table.
#[derive(Debug)]
pub struct FlowTable {
    entries: HashMap<FlowKey, Slot>,
    idle_order: BTreeMap<(Timestamp, u64), FlowKey>,
    next_serial: u64,
    max_entries: usize,
    idle_timeout: Duration,
}

impl FlowTable {
    pub fn new(max_entries: usize, idle_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            idle_order: BTreeMap::new(),
            next_serial: 0,
            max_entries,
            idle_timeout,
        }
    }

    /// Accounts one packet. Returns the entry evicted to make room, if any.
    pub fn upsert(&mut self, key: &FlowKey, now: Timestamp, packet_bytes: usize) -> Option<(FlowKey, FlowEntry)> {
        if let Some(slot) = self.entries.get_mut(key) {
            let entry = &mut slot.entry;
            let last_seen = entry.last_seen.max(now);
            if last_seen != entry.last_seen {
                self.idle_order.remove(&(entry.last_seen, slot.serial));
                self.idle_order.insert((last_seen, slot.serial), key.clone());
                entry.last_seen = last_seen;
            }
            if key.direction() == entry.initiator {
                entry.forward.record(packet_bytes);
            } else {
                entry.reverse.record(packet_bytes);
            }
            return None;
        }

        let evicted = if self.entries.len() >= self.max_entries {
            self.evict_oldest()
        } else {
            None
        };

        let mut entry = FlowEntry {
            first_seen: now,
            last_seen: now,
            initiator: key.direction(),
            forward: DirectionStats::default(),
            reverse: DirectionStats::default(),
        };
        entry.forward.record(packet_bytes);
        let serial = self.next_serial;
        self.next_serial += 1;
        self.idle_order.insert((now, serial), key.clone());
        self.entries.insert(key.clone(), Slot { entry, serial });
        evicted
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowEntry> {
        self.entries.get(key).map(|slot| &slot.entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, &FlowEntry)> {
        self.entries.iter().map(|(key, slot)| (key, &slot.entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes flows idle for longer than the timeout at capture time `now`.
    pub fn expire(&mut self, now: Timestamp) -> Vec<(FlowKey, FlowEntry)> {
        let mut expired = Vec::new();
        while let Some(oldest) = self.idle_order.first_entry() {
            if !is_expired(now, oldest.key().0, self.idle_timeout) {
                break;
            }
            let key = oldest.remove();
            if let Some((key, slot)) = self.entries.remove_entry(&key) {
                expired.push((key, slot.entry));
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), %now, "expired idle flows");
        }
        expired
    }

    fn evict_oldest(&mut self) -> Option<(FlowKey, FlowEntry)> {
        let ((last_seen, _), key) = self.idle_order.pop_first()?;
        debug!(%last_seen, "flow table full, evicting oldest flow");
        self.entries
            .remove_entry(&key)
            .map(|(key, slot)| (key, slot.entry))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::FlowTable;
    use crate::engine::registry::ProtocolId;
    use crate::packet::Timestamp;
    use crate::state::flow_key::FlowKey;

    fn key(src_last: u8, dst_last: u8, src_port: u16, dst_port: u16) -> FlowKey {
        FlowKey::builder()
            .protocol(ProtocolId::new(4))
            .pair(&[10, 0, 0, src_last], &[10, 0, 0, dst_last])
            .fixed(&[6])
            .pair(&src_port.to_be_bytes(), &dst_port.to_be_bytes())
            .build()
            .expect("key")
    }

    fn ms(value: u64) -> Timestamp {
        Timestamp::from_millis(value)
    }

    #[test]
    fn upsert_updates_existing_flow() {
        let mut table = FlowTable::new(1024, Duration::from_secs(60));
        let flow = key(1, 2, 1234, 80);

        table.upsert(&flow, ms(1000), 60);
        table.upsert(&flow, ms(2000), 120);

        let entry = table.get(&flow).expect("flow should exist");
        assert_eq!(entry.packet_count(), 2);
        assert_eq!(entry.byte_count(), 180);
        assert_eq!(entry.first_seen, ms(1000));
        assert_eq!(entry.last_seen, ms(2000));
    }

    #[test]
    fn replies_count_against_reverse_direction() {
        let mut table = FlowTable::new(16, Duration::from_secs(60));
        let request = key(9, 2, 1234, 80);
        let reply = key(2, 9, 80, 1234);

        table.upsert(&request, ms(1), 100);
        table.upsert(&reply, ms(2), 1500);
        table.upsert(&reply, ms(3), 1500);

        assert_eq!(table.len(), 1);
        let entry = table.get(&request).expect("flow");
        assert_eq!(entry.initiator, request.direction());
        assert_eq!((entry.forward.packets, entry.forward.bytes), (1, 100));
        assert_eq!((entry.reverse.packets, entry.reverse.bytes), (2, 3000));
    }

    #[test]
    fn evicts_oldest_when_capacity_hit() {
        let mut table = FlowTable::new(2, Duration::from_secs(60));
        let flow_a = key(1, 2, 1111, 80);
        let flow_b = key(3, 4, 2222, 80);
        let flow_c = key(5, 6, 3333, 80);

        table.upsert(&flow_a, ms(1000), 60);
        table.upsert(&flow_b, ms(2000), 60);
        let evicted = table.upsert(&flow_c, ms(3000), 60);

        assert_eq!(evicted.map(|(k, _)| k), Some(flow_a.clone()));
        assert!(table.get(&flow_a).is_none());
        assert!(table.get(&flow_b).is_some());
        assert!(table.get(&flow_c).is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn refreshed_flow_is_not_evicted_first() {
        let mut table = FlowTable::new(2, Duration::from_secs(60));
        let flow_a = key(1, 2, 1111, 80);
        let flow_b = key(3, 4, 2222, 80);

        table.upsert(&flow_a, ms(1000), 60);
        table.upsert(&flow_b, ms(2000), 60);
        table.upsert(&flow_a, ms(3000), 60);
        let evicted = table.upsert(&key(5, 6, 3333, 80), ms(4000), 60);

        assert_eq!(evicted.map(|(k, _)| k), Some(flow_b));
        assert!(table.get(&flow_a).is_some());
        assert!(table.expire(ms(63_000)).is_empty());
        assert_eq!(table.expire(ms(63_001)).len(), 1);
    }

    #[test]
    fn idle_flows_expire_on_capture_time() {
        let mut table = FlowTable::new(16, Duration::from_secs(30));
        let quiet = key(1, 2, 1000, 53);
        let busy = key(3, 4, 2000, 53);

        table.upsert(&quiet, Timestamp::from_secs(0), 80);
        table.upsert(&busy, Timestamp::from_secs(0), 80);
        table.upsert(&busy, Timestamp::from_secs(25), 80);

        assert!(table.expire(Timestamp::from_secs(30)).is_empty());
        let expired = table.expire(Timestamp::from_secs(31));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, quiet);
        assert!(table.get(&busy).is_some());
    }
}
