use serde::{Deserialize, Serialize};

/// Geographic position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Static reference data for one installed beacon.
///
/// Owned by the beacon directory; the positioning core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconRecord {
    pub beacon_id: String,
    pub coordinates: Coordinates,
    pub floor: Option<String>,
}

impl BeaconRecord {
    pub fn new(
        beacon_id: impl Into<String>,
        coordinates: Coordinates,
        floor: Option<String>,
    ) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            coordinates,
            floor,
        }
    }
}
