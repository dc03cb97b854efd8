//! Local buffer: the durable-enough handoff between producers and the
//! transmitter.
//!
//! Entries are appended per producer name in arrival order and retained
//! until they are transmitted upstream or evicted by the retention cap.
//! The cap is per name and bounded — on a device that stays offline, each
//! producer's oldest entries are dropped first while every other
//! producer's history is left untouched.
//!
//! Queries use the constrained language in [`predicate`]; a single coarse
//! lock guards all buckets (registration-rate operations and sub-second
//! scans, contention is not a concern at this scale).

pub mod predicate;

pub use predicate::Predicate;

use crate::bus::DataConsumer;
use crate::clock::Clock;
use crate::error::Result;
use crate::types::DataPoint;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One buffered data point.
#[derive(Debug, Clone)]
pub struct BufferEntry {
    /// Buffer-assigned sequence number; identifies the entry exactly
    /// (timestamps are not unique).
    seq: u64,
    point: Arc<DataPoint>,
    /// When the buffer accepted the entry, in clock milliseconds.
    accepted_at: i64,
    transmitted: bool,
}

impl BufferEntry {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn point(&self) -> &Arc<DataPoint> {
        &self.point
    }

    pub fn accepted_at(&self) -> i64 {
        self.accepted_at
    }

    pub fn transmitted(&self) -> bool {
        self.transmitted
    }
}

/// The only mutation the constrained update language supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryChange {
    transmitted: Option<bool>,
}

impl EntryChange {
    pub fn set_transmitted(flag: bool) -> Self {
        Self {
            transmitted: Some(flag),
        }
    }

    fn apply(&self, entry: &mut BufferEntry) {
        if let Some(flag) = self.transmitted {
            entry.transmitted = flag;
        }
    }
}

/// Notified after every accepted append; lets the transmitter re-evaluate
/// the flush condition continuously when the sample mode is real-time.
pub trait AppendListener: Send + Sync {
    fn on_append(&self);
}

#[derive(Default)]
struct BufferState {
    buckets: HashMap<String, VecDeque<BufferEntry>>,
    next_seq: u64,
    evicted_total: u64,
}

/// In-memory keyed time-series store of pending data points.
pub struct LocalBuffer {
    clock: Arc<dyn Clock>,
    retention_cap: AtomicUsize,
    state: Mutex<BufferState>,
}

impl LocalBuffer {
    pub fn new(clock: Arc<dyn Clock>, retention_cap: usize) -> Self {
        Self {
            clock,
            retention_cap: AtomicUsize::new(retention_cap.max(1)),
            state: Mutex::new(BufferState::default()),
        }
    }

    pub fn shared(clock: Arc<dyn Clock>, retention_cap: usize) -> Arc<Self> {
        Arc::new(Self::new(clock, retention_cap))
    }

    /// Change the per-producer retention cap. Takes effect on the next
    /// insert; existing over-cap buckets shrink as new data arrives.
    pub fn set_retention_cap(&self, cap: usize) {
        self.retention_cap.store(cap.max(1), Ordering::SeqCst);
    }

    pub fn retention_cap(&self) -> usize {
        self.retention_cap.load(Ordering::SeqCst)
    }

    /// Append a point under its producer name. Returns the assigned
    /// sequence number. If the bucket exceeds the retention cap, its
    /// oldest entries are evicted first; other producers are unaffected.
    pub fn insert(&self, point: Arc<DataPoint>) -> u64 {
        let accepted_at = self.clock.now_ms();
        let cap = self.retention_cap();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let seq = state.next_seq;
        state.next_seq += 1;

        let name = point.producer_name().to_string();
        let mut evicted = 0u64;
        let bucket = state.buckets.entry(name).or_default();
        bucket.push_back(BufferEntry {
            seq,
            point,
            accepted_at,
            transmitted: false,
        });
        while bucket.len() > cap {
            bucket.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            state.evicted_total += evicted;
            tracing::warn!(evicted, cap, "retention cap exceeded, dropped oldest entries");
        }
        seq
    }

    /// Entries matching the predicate, ordered by insertion (sequence).
    pub fn query(&self, predicate: &Predicate) -> Vec<BufferEntry> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<BufferEntry> = match predicate.pinned_producer() {
            Some(name) => state
                .buckets
                .get(name)
                .map(|bucket| Self::scan(bucket, predicate))
                .unwrap_or_default(),
            None => state
                .buckets
                .values()
                .flat_map(|bucket| Self::scan(bucket, predicate))
                .collect(),
        };
        matches.sort_by_key(BufferEntry::seq);
        matches
    }

    fn scan(bucket: &VecDeque<BufferEntry>, predicate: &Predicate) -> Vec<BufferEntry> {
        bucket
            .iter()
            .filter(|e| predicate.matches(e.point.producer_name(), e.point.timestamp()))
            .cloned()
            .collect()
    }

    /// Delete matching entries. Returns how many were removed.
    pub fn delete(&self, predicate: &Predicate) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for bucket in state.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|e| !predicate.matches(e.point.producer_name(), e.point.timestamp()));
            removed += before - bucket.len();
        }
        state.buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    /// Apply a constrained change to matching entries. Returns how many
    /// were updated.
    pub fn update(&self, predicate: &Predicate, change: EntryChange) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut updated = 0;
        for bucket in state.buckets.values_mut() {
            for entry in bucket.iter_mut() {
                if predicate.matches(entry.point.producer_name(), entry.point.timestamp()) {
                    change.apply(entry);
                    updated += 1;
                }
            }
        }
        updated
    }

    /// Untransmitted entries grouped per producer name, each group in
    /// insertion order. Names are sorted for deterministic batch order.
    pub fn untransmitted_by_producer(&self) -> Vec<(String, Vec<BufferEntry>)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut groups: Vec<(String, Vec<BufferEntry>)> = state
            .buckets
            .iter()
            .filter_map(|(name, bucket)| {
                let pending: Vec<BufferEntry> =
                    bucket.iter().filter(|e| !e.transmitted).cloned().collect();
                (!pending.is_empty()).then(|| (name.clone(), pending))
            })
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        groups
    }

    /// Remove exactly the given entries (by sequence number) from one
    /// producer's bucket. Used by the transmitter to purge a successfully
    /// uploaded batch without touching entries that arrived meanwhile.
    pub fn remove_seqs(&self, name: &str, seqs: &[u64]) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(bucket) = state.buckets.get_mut(name) else {
            return 0;
        };
        let before = bucket.len();
        bucket.retain(|e| !seqs.contains(&e.seq));
        let removed = before - bucket.len();
        if bucket.is_empty() {
            state.buckets.remove(name);
        }
        removed
    }

    /// Total buffered entries across all producers.
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.buckets.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered entries for one producer.
    pub fn len_for(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.buckets.get(name).map_or(0, VecDeque::len)
    }

    /// Entries dropped by retention eviction since construction.
    pub fn evicted_total(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.evicted_total
    }
}

/// Bus-facing adapter: subscribes the buffer to producer names.
///
/// Every accepted point lands in the buffer; if an append listener is
/// wired (real-time sample mode), it is notified after the insert so the
/// transmitter can re-check its flush condition immediately.
pub struct BufferConsumer {
    buffer: Arc<LocalBuffer>,
    listener: Mutex<Option<Arc<dyn AppendListener>>>,
}

impl BufferConsumer {
    pub fn new(buffer: Arc<LocalBuffer>) -> Arc<Self> {
        Arc::new(Self {
            buffer,
            listener: Mutex::new(None),
        })
    }

    pub fn set_append_listener(&self, listener: Arc<dyn AppendListener>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    pub fn clear_append_listener(&self) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl DataConsumer for BufferConsumer {
    fn on_data(&self, point: Arc<DataPoint>) -> Result<()> {
        self.buffer.insert(point);
        let listener = self.listener.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(listener) = listener {
            listener.on_append();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::DataValue;

    fn buffer_with_cap(cap: usize) -> (Arc<LocalBuffer>, Arc<ManualClock>) {
        let clock = ManualClock::shared(0);
        let buffer = LocalBuffer::shared(clock.clone(), cap);
        (buffer, clock)
    }

    fn insert_float(buffer: &LocalBuffer, name: &str, ts: i64, value: f64) -> u64 {
        buffer.insert(
            DataPoint::new(name, ts, DataValue::Float(value))
                .unwrap()
                .into_shared(),
        )
    }

    #[test]
    fn test_query_by_name_and_time_in_insertion_order() {
        let (buffer, _) = buffer_with_cap(100);
        for i in 0..10 {
            insert_float(&buffer, "light", i * 10, i as f64);
        }
        insert_float(&buffer, "noise", 55, 99.0);

        let predicate: Predicate = "sensor_name='light' AND timestamp>40".parse().unwrap();
        let hits = buffer.query(&predicate);
        let stamps: Vec<i64> = hits.iter().map(|e| e.point().timestamp()).collect();
        assert_eq!(stamps, vec![50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_retention_cap_evicts_oldest_of_that_producer_only() {
        let (buffer, _) = buffer_with_cap(3);
        insert_float(&buffer, "noise", 1, 0.0);
        for i in 0..5 {
            insert_float(&buffer, "light", i, i as f64);
        }

        assert_eq!(buffer.len_for("light"), 3);
        assert_eq!(buffer.len_for("noise"), 1);
        assert_eq!(buffer.evicted_total(), 2);

        let remaining = buffer.query(&Predicate::all().producer_eq("light"));
        let stamps: Vec<i64> = remaining.iter().map(|e| e.point().timestamp()).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
    }

    #[test]
    fn test_delete_by_predicate() {
        let (buffer, _) = buffer_with_cap(100);
        for i in 0..4 {
            insert_float(&buffer, "light", i, 0.0);
        }
        let removed = buffer.delete(&Predicate::all().producer_eq("light").timestamp_le(1));
        assert_eq!(removed, 2);
        assert_eq!(buffer.len_for("light"), 2);
    }

    #[test]
    fn test_update_sets_transmitted_flag() {
        let (buffer, _) = buffer_with_cap(100);
        insert_float(&buffer, "light", 1, 0.0);
        insert_float(&buffer, "light", 2, 0.0);

        let updated = buffer.update(
            &Predicate::all().timestamp_le(1),
            EntryChange::set_transmitted(true),
        );
        assert_eq!(updated, 1);

        let pending = buffer.untransmitted_by_producer();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.len(), 1);
        assert_eq!(pending[0].1[0].point().timestamp(), 2);
    }

    #[test]
    fn test_remove_seqs_is_exact() {
        let (buffer, _) = buffer_with_cap(100);
        // duplicate timestamps: seq is the only safe identity
        let a = insert_float(&buffer, "light", 7, 1.0);
        let _b = insert_float(&buffer, "light", 7, 2.0);
        let c = insert_float(&buffer, "light", 7, 3.0);

        assert_eq!(buffer.remove_seqs("light", &[a, c]), 2);
        let left = buffer.query(&Predicate::all().producer_eq("light"));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].point().value(), &DataValue::Float(2.0));
    }

    #[test]
    fn test_accepted_at_comes_from_clock() {
        let (buffer, clock) = buffer_with_cap(100);
        clock.set(12_345);
        insert_float(&buffer, "light", 1, 0.0);
        let entries = buffer.query(&Predicate::all());
        assert_eq!(entries[0].accepted_at(), 12_345);
    }

    #[test]
    fn test_buffer_consumer_inserts_and_pokes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Poked(AtomicUsize);
        impl AppendListener for Poked {
            fn on_append(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (buffer, _) = buffer_with_cap(100);
        let consumer = BufferConsumer::new(buffer.clone());
        let poked = Arc::new(Poked(AtomicUsize::new(0)));
        consumer.set_append_listener(poked.clone());

        let point = DataPoint::new("light", 1, DataValue::Float(0.5))
            .unwrap()
            .into_shared();
        consumer.on_data(point).unwrap();

        assert_eq!(buffer.len_for("light"), 1);
        assert_eq!(poked.0.load(Ordering::SeqCst), 1);
    }
}
