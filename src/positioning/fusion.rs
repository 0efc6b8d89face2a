use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::{BeaconRecord, LocationEstimate, ObservationEntry};

use super::config::{RadiusConfig, SignalModelConfig};
use super::signal::{distance_from_rssi, radius_from_entries};

/// Combines a window snapshot into a single location estimate.
#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    pub signal: SignalModelConfig,
    pub radius: RadiusConfig,
}

impl FusionEngine {
    pub fn new(signal: SignalModelConfig, radius: RadiusConfig) -> Self {
        Self { signal, radius }
    }

    /// Fuse `snapshot` into an estimate for `user_id`.
    ///
    /// The strongest beacon the directory knows becomes the anchor; beacons it
    /// does not know still tighten the radius. Returns `None` when no entry
    /// resolves, which callers treat as "nothing to publish".
    pub fn fuse<F>(
        &self,
        user_id: &str,
        snapshot: &[ObservationEntry],
        lookup: F,
        authorized_viewers: &BTreeSet<String>,
        updated_at: DateTime<Utc>,
    ) -> Option<LocationEstimate>
    where
        F: Fn(&str) -> Option<BeaconRecord>,
    {
        let entries: Vec<ObservationEntry> = snapshot
            .iter()
            .map(|entry| ObservationEntry {
                distance_m: Some(distance_from_rssi(entry.rssi, &self.signal)),
                ..entry.clone()
            })
            .collect();

        let (anchor, record) = entries
            .iter()
            .filter_map(|entry| lookup(entry.beacon_id.as_str()).map(|record| (entry, record)))
            .max_by(|(a, _), (b, _)| anchor_order(a, b))?;

        let radius_m = radius_from_entries(&entries, &self.signal, &self.radius);

        Some(LocationEstimate {
            user_id: user_id.to_string(),
            floor: record.floor,
            anchor_beacon_id: anchor.beacon_id.clone(),
            coordinates: record.coordinates,
            radius_m,
            entries,
            shared_to: authorized_viewers.clone(),
            updated_at,
        })
    }
}

// Stronger signal wins, then the fresher reading, then the smaller id, so the
// choice never depends on snapshot order.
fn anchor_order(a: &ObservationEntry, b: &ObservationEntry) -> Ordering {
    a.rssi
        .cmp(&b.rssi)
        .then_with(|| a.timestamp_ms.cmp(&b.timestamp_ms))
        .then_with(|| b.beacon_id.cmp(&a.beacon_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use std::collections::HashMap;

    fn directory() -> HashMap<String, BeaconRecord> {
        [
            BeaconRecord::new("lib-1", Coordinates::new(59.3470, 18.0730), Some("2".into())),
            BeaconRecord::new("lib-2", Coordinates::new(59.3472, 18.0735), None),
        ]
        .into_iter()
        .map(|record| (record.beacon_id.clone(), record))
        .collect()
    }

    fn fuse(engine: &FusionEngine, snapshot: &[ObservationEntry]) -> Option<LocationEstimate> {
        let dir = directory();
        engine.fuse(
            "user-1",
            snapshot,
            |id| dir.get(id).cloned(),
            &BTreeSet::from(["friend-a".to_string()]),
            Utc::now(),
        )
    }

    #[test]
    fn nothing_resolves() {
        let engine = FusionEngine::default();
        let snapshot = vec![
            ObservationEntry::new("ghost-1", -50, 10),
            ObservationEntry::new("ghost-2", -60, 10),
        ];
        assert!(fuse(&engine, &snapshot).is_none());
    }

    #[test]
    fn empty_snapshot() {
        assert!(fuse(&FusionEngine::default(), &[]).is_none());
    }

    #[test]
    fn strongest_resolved_beacon_is_anchor_in_any_order() {
        let engine = FusionEngine::default();
        let weak = ObservationEntry::new("lib-1", -72, 10);
        let strong = ObservationEntry::new("lib-2", -48, 5);

        for snapshot in [vec![weak.clone(), strong.clone()], vec![strong, weak]] {
            let estimate = fuse(&engine, &snapshot).unwrap();
            assert_eq!(estimate.anchor_beacon_id, "lib-2");
            assert_eq!(estimate.coordinates, Coordinates::new(59.3472, 18.0735));
            assert_eq!(estimate.floor, None);
        }
    }

    #[test]
    fn unknown_beacons_count_towards_radius_but_not_anchor() {
        let engine = FusionEngine::default();
        let snapshot = vec![
            ObservationEntry::new("ghost", -40, 10),
            ObservationEntry::new("lib-1", -70, 10),
        ];

        let estimate = fuse(&engine, &snapshot).unwrap();
        assert_eq!(estimate.anchor_beacon_id, "lib-1");
        assert_eq!(estimate.floor.as_deref(), Some("2"));
        assert_eq!(estimate.entries.len(), 2);

        let nearest = distance_from_rssi(-40, &engine.signal);
        let expected = (nearest + 5.0).max(5.0);
        assert!((estimate.radius_m - expected).abs() < 1e-9);
    }

    #[test]
    fn contributing_entries_carry_distances_and_viewers() {
        let engine = FusionEngine::default();
        let estimate = fuse(&engine, &[ObservationEntry::new("lib-1", -59, 10)]).unwrap();

        let distance = estimate.entries[0].distance_m.unwrap();
        assert!((distance - 1.0).abs() < 1e-9);
        assert!((estimate.radius_m - 16.0).abs() < 1e-9);
        assert!(estimate.is_visible_to("friend-a"));
        assert!(estimate.is_visible_to("user-1"));
        assert!(!estimate.is_visible_to("stranger"));
    }

    #[test]
    fn equal_rssi_prefers_fresher_reading() {
        let engine = FusionEngine::default();
        let snapshot = vec![
            ObservationEntry::new("lib-1", -60, 100),
            ObservationEntry::new("lib-2", -60, 200),
        ];
        assert_eq!(fuse(&engine, &snapshot).unwrap().anchor_beacon_id, "lib-2");
    }
}
