use std::collections::HashSet;

use parking_lot::Mutex;

use super::protocol::Value;

/// Everything a node has seen, plus what it still owes the cluster.
///
/// The seen set and the pending batch sit behind one mutex on purpose: with
/// two independent locks a value could be marked seen without being queued
/// (or queued twice) depending on interleaving. The lock is only ever held
/// for the in-memory mutation, never across a network call.
pub struct BroadcastState {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<Value>,
    pending: Vec<Value>,
}

impl BroadcastState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Marks `value` seen and, only when it is new, queues it for the next
    /// dissemination round. Returns whether the value was newly seen.
    pub fn observe(&self, value: Value) -> bool {
        let mut inner = self.inner.lock();
        let newly_seen = inner.seen.insert(value);
        if newly_seen {
            inner.pending.push(value);
        }
        newly_seen
    }

    /// `observe` for a whole submission under a single lock acquisition.
    /// Returns how many of the values were newly seen.
    pub fn observe_all(&self, values: &[Value]) -> usize {
        let mut inner = self.inner.lock();
        let mut newly_seen = 0;
        for &value in values {
            if inner.seen.insert(value) {
                inner.pending.push(value);
                newly_seen += 1;
            }
        }
        newly_seen
    }

    /// Marks `value` seen without queuing it. Used where propagation is
    /// handled immediately (eager fan-out) or not at all (`yap` receipt), so
    /// the batch cannot grow with no flush loop draining it.
    pub fn mark_seen(&self, value: Value) -> bool {
        self.inner.lock().seen.insert(value)
    }

    /// The full seen set, in no particular order.
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.lock().seen.iter().copied().collect()
    }

    /// Takes the pending batch out, leaving it empty. Values observed after
    /// this call land in the next round; the taken batch is never re-queued.
    pub fn drain_pending(&self) -> Vec<Value> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    pub fn seen_count(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Default for BroadcastState {
    fn default() -> Self {
        Self::new()
    }
}
