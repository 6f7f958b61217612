//! Bounded task-history buffer.
//!
//! Holds the most recent `(features, provider, outcome)` tuples for the
//! mutual-information estimator.  The buffer is a FIFO with a fixed capacity:
//! once full, each push evicts the oldest entry.  A per-provider sample count
//! is maintained alongside so the selection engine can check the minimum
//! sample threshold without scanning.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::TaskFeatures;

/// One recorded outcome, paired with the provider state it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub provider_id: String,
    pub features: TaskFeatures,
    pub success: bool,
    pub latency_ms: f64,
    pub cost: f64,
    /// Provider history vector right after this outcome was folded in.
    pub provider_vector: [f64; 7],
    pub recorded_at: DateTime<Utc>,
}

struct Buffer {
    entries: VecDeque<HistoryEntry>,
    per_provider: HashMap<String, usize>,
}

/// Thread-safe bounded FIFO of [`HistoryEntry`] values.
pub struct TaskHistory {
    capacity: usize,
    buffer: Mutex<Buffer>,
}

impl TaskHistory {
    /// Create an empty buffer.  A capacity of `0` is treated as `1`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Mutex::new(Buffer {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                per_provider: HashMap::new(),
            }),
        }
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&self, entry: HistoryEntry) {
        let mut buf = self.lock();

        if buf.entries.len() == self.capacity {
            if let Some(evicted) = buf.entries.pop_front() {
                decrement(&mut buf.per_provider, &evicted.provider_id);
                tracing::trace!(provider_id = %evicted.provider_id, "history entry evicted");
            }
        }

        *buf.per_provider.entry(entry.provider_id.clone()).or_insert(0) += 1;
        buf.entries.push_back(entry);
    }

    /// Number of retained samples for `provider_id`.
    pub fn count_for(&self, provider_id: &str) -> usize {
        self.lock().per_provider.get(provider_id).copied().unwrap_or(0)
    }

    /// Copy of every retained entry for `provider_id`, oldest first.
    pub fn entries_for(&self, provider_id: &str) -> Vec<HistoryEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.provider_id == provider_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // A panic while holding the lock cannot leave the deque half-written,
        // so a poisoned buffer is still usable.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn decrement(counts: &mut HashMap<String, usize>, provider_id: &str) {
    if let Some(count) = counts.get_mut(provider_id) {
        *count -= 1;
        if *count == 0 {
            counts.remove(provider_id);
        }
    }
}
