use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{from_str, to_string};

use crate::db::{
    helpers::{conversion_error, parse_datetime},
    Database,
};
use crate::models::{Coordinates, LocationEstimate, ObservationEntry};

const LOCATION_COLUMNS: &str = "l.user_id, l.floor, l.anchor_beacon_id, l.latitude, l.longitude,
     l.radius_m, l.entries_json, l.updated_at";

/// Row without its viewer set; that lives in `location_viewers`.
fn location_from_row(row: &Row<'_>) -> rusqlite::Result<LocationEstimate> {
    let entries_json: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    let entries: Vec<ObservationEntry> = from_str(&entries_json)
        .map_err(|err| conversion_error(anyhow::Error::new(err).context("entries_json")))?;
    let updated_at = parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?;

    Ok(LocationEstimate {
        user_id: row.get(0)?,
        floor: row.get(1)?,
        anchor_beacon_id: row.get(2)?,
        coordinates: Coordinates {
            latitude: row.get(3)?,
            longitude: row.get(4)?,
        },
        radius_m: row.get(5)?,
        entries,
        shared_to: BTreeSet::new(),
        updated_at,
    })
}

fn load_viewers(conn: &Connection, user_id: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT viewer_id FROM location_viewers
         WHERE user_id = ?1",
    )?;
    let viewers = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(viewers)
}

fn with_viewers(conn: &Connection, mut estimate: LocationEstimate) -> Result<LocationEstimate> {
    estimate.shared_to = load_viewers(conn, &estimate.user_id)?;
    Ok(estimate)
}

impl Database {
    /// Replace the live location for `estimate.user_id` and its viewer set.
    pub async fn upsert_location(&self, estimate: &LocationEstimate) -> Result<()> {
        let record = estimate.clone();
        self.execute(move |conn| {
            let entries_json =
                to_string(&record.entries).context("failed to serialize contributing entries")?;

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO locations (
                    user_id, floor, anchor_beacon_id, latitude, longitude,
                    radius_m, entries_json, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(user_id) DO UPDATE SET
                    floor = excluded.floor,
                    anchor_beacon_id = excluded.anchor_beacon_id,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    radius_m = excluded.radius_m,
                    entries_json = excluded.entries_json,
                    updated_at = excluded.updated_at",
                params![
                    record.user_id,
                    record.floor,
                    record.anchor_beacon_id,
                    record.coordinates.latitude,
                    record.coordinates.longitude,
                    record.radius_m,
                    entries_json,
                    record.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to upsert location for {}", record.user_id))?;

            tx.execute(
                "DELETE FROM location_viewers WHERE user_id = ?1",
                params![record.user_id],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO location_viewers (user_id, viewer_id) VALUES (?1, ?2)",
                )?;
                for viewer in &record.shared_to {
                    insert.execute(params![record.user_id, viewer])?;
                }
            }

            tx.commit().context("failed to commit location upsert")?;
            Ok(())
        })
        .await
    }

    pub async fn get_location(&self, user_id: &str) -> Result<Option<LocationEstimate>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let estimate = conn
                .query_row(
                    &format!("SELECT {LOCATION_COLUMNS} FROM locations l WHERE l.user_id = ?1"),
                    params![user_id],
                    location_from_row,
                )
                .optional()
                .context("failed to query location")?;

            estimate.map(|e| with_viewers(conn, e)).transpose()
        })
        .await
    }

    /// Live locations shared with `viewer_id`, most recently updated first.
    pub async fn locations_visible_to(&self, viewer_id: &str) -> Result<Vec<LocationEstimate>> {
        let viewer_id = viewer_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOCATION_COLUMNS}
                 FROM locations l
                 JOIN location_viewers v ON v.user_id = l.user_id
                 WHERE v.viewer_id = ?1
                 ORDER BY l.updated_at DESC"
            ))?;
            let estimates = stmt
                .query_map(params![viewer_id], location_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);

            estimates
                .into_iter()
                .map(|e| with_viewers(conn, e))
                .collect()
        })
        .await
    }

    /// Remove a user's live location. Returns whether a row existed.
    pub async fn delete_location(&self, user_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM locations WHERE user_id = ?1", params![user_id])
                .context("failed to delete location")?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn estimate(user: &str, viewers: &[&str], radius: f64) -> LocationEstimate {
        let mut entry = ObservationEntry::new("001", -45, 1_000);
        entry.distance_m = Some(0.3);
        LocationEstimate {
            user_id: user.to_string(),
            floor: Some("3".into()),
            anchor_beacon_id: "001".into(),
            coordinates: Coordinates::new(59.3293, 18.0686),
            radius_m: radius,
            entries: vec![entry],
            shared_to: viewers.iter().map(|v| v.to_string()).collect(),
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_previous_row() {
        let db = Database::in_memory().unwrap();
        db.upsert_location(&estimate("u1", &["a", "b"], 17.0)).await.unwrap();
        db.upsert_location(&estimate("u1", &["c"], 9.0)).await.unwrap();

        let stored = db.get_location("u1").await.unwrap().unwrap();
        assert_eq!(stored.radius_m, 9.0);
        assert_eq!(stored.shared_to, BTreeSet::from(["c".to_string()]));
        assert_eq!(stored.entries.len(), 1);
        assert_eq!(stored, estimate("u1", &["c"], 9.0));
    }

    #[tokio::test]
    async fn visibility_follows_viewer_set() {
        let db = Database::in_memory().unwrap();
        db.upsert_location(&estimate("u1", &["friend"], 10.0)).await.unwrap();
        db.upsert_location(&estimate("u2", &[], 10.0)).await.unwrap();

        let visible = db.locations_visible_to("friend").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].user_id, "u1");
        assert!(db.locations_visible_to("stranger").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_viewers() {
        let db = Database::in_memory().unwrap();
        db.upsert_location(&estimate("u1", &["friend"], 10.0)).await.unwrap();

        assert!(db.delete_location("u1").await.unwrap());
        assert!(!db.delete_location("u1").await.unwrap());
        assert!(db.get_location("u1").await.unwrap().is_none());
        assert!(db.locations_visible_to("friend").await.unwrap().is_empty());
    }
}
