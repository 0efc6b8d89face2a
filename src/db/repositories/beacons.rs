use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::Database;
use crate::directory::BeaconDirectory;
use crate::models::{BeaconRecord, Coordinates};

fn beacon_from_row(row: &Row<'_>) -> rusqlite::Result<BeaconRecord> {
    Ok(BeaconRecord {
        beacon_id: row.get(0)?,
        coordinates: Coordinates {
            latitude: row.get(1)?,
            longitude: row.get(2)?,
        },
        floor: row.get(3)?,
    })
}

impl Database {
    pub async fn upsert_beacon(&self, record: &BeaconRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO beacons (beacon_id, latitude, longitude, floor)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(beacon_id) DO UPDATE SET
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     floor = excluded.floor",
                params![
                    record.beacon_id,
                    record.coordinates.latitude,
                    record.coordinates.longitude,
                    record.floor,
                ],
            )
            .with_context(|| format!("failed to upsert beacon {}", record.beacon_id))?;
            Ok(())
        })
        .await
    }

    pub async fn get_beacon(&self, beacon_id: &str) -> Result<Option<BeaconRecord>> {
        let beacon_id = beacon_id.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT beacon_id, latitude, longitude, floor
                 FROM beacons
                 WHERE beacon_id = ?1",
                params![beacon_id],
                beacon_from_row,
            )
            .optional()
            .context("failed to query beacon")
        })
        .await
    }

    pub async fn list_beacons(&self) -> Result<Vec<BeaconRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT beacon_id, latitude, longitude, floor
                 FROM beacons
                 ORDER BY beacon_id ASC",
            )?;
            let beacons = stmt
                .query_map([], beacon_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(beacons)
        })
        .await
    }
}

#[async_trait]
impl BeaconDirectory for Database {
    async fn lookup(&self, beacon_id: &str) -> Result<Option<BeaconRecord>> {
        self.get_beacon(beacon_id).await
    }
}
