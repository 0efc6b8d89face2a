//! Beacon directory seam.
//!
//! The directory maps a beacon id to where the beacon is mounted. Production
//! hosts back it with their reference-data service; `StaticDirectory` covers
//! bundled JSON files and tests, and `Database` implements it over SQLite.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::BeaconRecord;

#[async_trait]
pub trait BeaconDirectory: Send + Sync {
    /// `Ok(None)` means the beacon is unknown; `Err` is a lookup failure.
    async fn lookup(&self, beacon_id: &str) -> Result<Option<BeaconRecord>>;
}

#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: RwLock<HashMap<String, BeaconRecord>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = BeaconRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.beacon_id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load a JSON array of beacon records.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read beacon directory {}", path.display()))?;
        let records: Vec<BeaconRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("invalid beacon directory {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    pub fn insert(&self, record: BeaconRecord) {
        let mut guard = self.records.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(record.beacon_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, beacon_id: &str) -> Option<BeaconRecord> {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(beacon_id)
            .cloned()
    }
}

#[async_trait]
impl BeaconDirectory for StaticDirectory {
    async fn lookup(&self, beacon_id: &str) -> Result<Option<BeaconRecord>> {
        Ok(self.get(beacon_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;

    #[tokio::test]
    async fn lookup_known_and_unknown() {
        let directory = StaticDirectory::from_records([BeaconRecord::new(
            "001",
            Coordinates::new(59.0, 18.0),
            Some("1".into()),
        )]);

        assert!(directory.lookup("001").await.unwrap().is_some());
        assert!(directory.lookup("999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_adds_and_replaces_records() {
        let directory = StaticDirectory::new();
        assert!(directory.is_empty());

        directory.insert(BeaconRecord::new("001", Coordinates::new(1.0, 1.0), None));
        directory.insert(BeaconRecord::new(
            "001",
            Coordinates::new(2.0, 2.0),
            Some("3".into()),
        ));

        assert_eq!(directory.len(), 1);
        let record = directory.lookup("001").await.unwrap().unwrap();
        assert_eq!(record.coordinates, Coordinates::new(2.0, 2.0));
        assert_eq!(record.floor.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn loads_json_file() {
        let path = std::env::temp_dir().join(format!("beacons-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"beaconId":"001","coordinates":{"latitude":1.5,"longitude":2.5},"floor":null}]"#,
        )
        .unwrap();

        let directory = StaticDirectory::from_json_file(&path).unwrap();
        let record = directory.lookup("001").await.unwrap().unwrap();
        assert_eq!(record.coordinates, Coordinates::new(1.5, 2.5));
        assert_eq!(record.floor, None);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("beacons-bad-{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();
        assert!(StaticDirectory::from_json_file(&path).is_err());
        std::fs::remove_file(path).ok();
    }
}
