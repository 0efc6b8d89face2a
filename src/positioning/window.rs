//! Bounded store of the latest reading per beacon.
//!
//! Not synchronized on its own; the engine keeps it behind a mutex so every
//! mutation is atomic with respect to snapshots.

use std::collections::HashMap;

use crate::models::ObservationEntry;

use super::config::WindowConfig;

#[derive(Debug, Clone)]
pub struct ObservationWindow {
    capacity: usize,
    entries: HashMap<String, ObservationEntry>,
}

impl ObservationWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the latest reading for `beacon_id`.
    ///
    /// An existing entry is replaced in place. A new beacon arriving at
    /// capacity pushes out the oldest entry, which is returned.
    pub fn upsert(
        &mut self,
        beacon_id: &str,
        rssi: i32,
        timestamp_ms: i64,
    ) -> Option<ObservationEntry> {
        if let Some(entry) = self.entries.get_mut(beacon_id) {
            entry.rssi = rssi;
            entry.timestamp_ms = timestamp_ms;
            entry.distance_m = None;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.oldest_id().and_then(|id| self.entries.remove(&id))
        } else {
            None
        };

        self.entries.insert(
            beacon_id.to_string(),
            ObservationEntry::new(beacon_id, rssi, timestamp_ms),
        );
        evicted
    }

    /// Drop every entry older than `max_age_ms` relative to `now_ms`.
    pub fn evict_stale(&mut self, now_ms: i64, max_age_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.age_ms(now_ms) <= max_age_ms);
        before - self.entries.len()
    }

    /// Copy of the current entries, newest first.
    pub fn snapshot(&self) -> Vec<ObservationEntry> {
        let mut entries: Vec<ObservationEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then_with(|| a.beacon_id.cmp(&b.beacon_id))
        });
        entries
    }

    // Ties on timestamp go to the smaller id so eviction is deterministic.
    fn oldest_id(&self) -> Option<String> {
        self.entries
            .values()
            .min_by(|a, b| {
                a.timestamp_ms
                    .cmp(&b.timestamp_ms)
                    .then_with(|| a.beacon_id.cmp(&b.beacon_id))
            })
            .map(|entry| entry.beacon_id.clone())
    }
}

impl Default for ObservationWindow {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}
