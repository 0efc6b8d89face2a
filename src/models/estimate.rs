use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Coordinates, ObservationEntry};

/// The single live location of a user.
///
/// Upserted by user id on every fusion cycle; never appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationEstimate {
    pub user_id: String,
    pub floor: Option<String>,
    pub anchor_beacon_id: String,
    pub coordinates: Coordinates,
    /// Positioning uncertainty in meters.
    pub radius_m: f64,
    pub entries: Vec<ObservationEntry>,
    pub shared_to: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl LocationEstimate {
    /// Whether `viewer_id` may see this estimate. Owners always can.
    pub fn is_visible_to(&self, viewer_id: &str) -> bool {
        self.user_id == viewer_id || self.shared_to.contains(viewer_id)
    }
}
