//! Raw advertisement model.
//!
//! A `Sighting` is produced by the host's BLE scan callback, one per
//! advertisement event. It is classified by the validity filter and then
//! dropped; only the derived `ObservationEntry` is retained.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single raw beacon advertisement as delivered by the scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sighting {
    pub beacon_id: String,
    /// Received signal strength in dBm. Some platforms deliver events
    /// without a reading; those are never considered for positioning.
    pub rssi: Option<i32>,
    pub timestamp_ms: i64,
    /// Service identifiers the advertisement declares.
    #[serde(default)]
    pub service_uuids: Vec<String>,
    /// Service data blocks keyed by service identifier.
    #[serde(default)]
    pub service_data: HashMap<String, Vec<u8>>,
    #[serde(default)]
    pub manufacturer_data: Option<Vec<u8>>,
}

impl Sighting {
    pub fn new(beacon_id: impl Into<String>, rssi: i32, timestamp_ms: i64) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            rssi: Some(rssi),
            timestamp_ms,
            ..Self::default()
        }
    }

    /// Attach a service data block and declare its service id.
    pub fn with_service_data(mut self, service_id: impl Into<String>, data: &[u8]) -> Self {
        let service_id = service_id.into();
        if !self.service_uuids.contains(&service_id) {
            self.service_uuids.push(service_id.clone());
        }
        self.service_data.insert(service_id, data.to_vec());
        self
    }

    pub fn with_manufacturer_data(mut self, data: &[u8]) -> Self {
        self.manufacturer_data = Some(data.to_vec());
        self
    }

    pub fn declaring(mut self, service_id: impl Into<String>) -> Self {
        self.service_uuids.push(service_id.into());
        self
    }

    /// Service data stored under `service_id`, matched ignoring ASCII case.
    pub fn service_data_for(&self, service_id: &str) -> Option<&[u8]> {
        self.service_data
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(service_id))
            .map(|(_, data)| data.as_slice())
    }

    pub fn declares_service(&self, service_id: &str) -> bool {
        self.service_uuids
            .iter()
            .any(|uuid| uuid.eq_ignore_ascii_case(service_id))
    }
}
