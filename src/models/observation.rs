use serde::{Deserialize, Serialize};

/// Most recent accepted reading for one beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationEntry {
    pub beacon_id: String,
    pub rssi: i32,
    pub timestamp_ms: i64,
    /// Estimated distance in meters. `None` while the entry sits in the
    /// observation window; filled in when the entry contributes to an estimate.
    pub distance_m: Option<f64>,
}

impl ObservationEntry {
    pub fn new(beacon_id: impl Into<String>, rssi: i32, timestamp_ms: i64) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            rssi,
            timestamp_ms,
            distance_m: None,
        }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }
}
