use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::directory::BeaconDirectory;
use crate::metrics::MetricsCollector;
use crate::models::{LocationEstimate, ObservationEntry, Sighting};
use crate::positioning::{
    classify, Classification, FusionEngine, ObservationWindow, PositioningConfig,
};
use crate::publisher::LocationPublisher;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Entry point for the positioning pipeline.
///
/// Cheap to clone; clones share one observation window. The window lock is
/// only ever held for in-memory work, never across directory or publisher
/// calls.
#[derive(Clone)]
pub struct PositioningEngine {
    config: Arc<PositioningConfig>,
    window: Arc<Mutex<ObservationWindow>>,
    fusion: FusionEngine,
    metrics: MetricsCollector,
}

impl PositioningEngine {
    pub fn new(config: PositioningConfig) -> Result<Self> {
        config.validate().context("invalid positioning configuration")?;

        Ok(Self {
            window: Arc::new(Mutex::new(ObservationWindow::from_config(&config.window))),
            fusion: FusionEngine::new(config.signal.clone(), config.radius.clone()),
            config: Arc::new(config),
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &PositioningConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn window(&self) -> MutexGuard<'_, ObservationWindow> {
        self.window.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Classify a raw sighting and fold it into the window if usable.
    pub fn ingest(&self, sighting: &Sighting) -> Classification {
        let classification = classify(sighting, &self.config.filter);

        match &classification {
            Classification::Accepted(room) => {
                // Accepted implies an rssi was present.
                let rssi = sighting.rssi.unwrap_or(self.config.filter.min_rssi);
                let evicted = self
                    .window()
                    .upsert(&sighting.beacon_id, rssi, sighting.timestamp_ms);

                if let Some(evicted) = &evicted {
                    log_debug!(
                        "window full; dropped beacon {} for {}",
                        evicted.beacon_id,
                        sighting.beacon_id
                    );
                }
                log_debug!(
                    "accepted beacon {} room={} rssi={}",
                    sighting.beacon_id,
                    room,
                    rssi
                );
                self.metrics.record_accepted(evicted.is_some());
            }
            Classification::Rejected(reason) => {
                log_debug!("rejected beacon {}: {}", sighting.beacon_id, reason);
                self.metrics.record_rejected(*reason);
            }
        }

        classification
    }

    pub fn evict_stale(&self, now_ms: i64) -> usize {
        self.window().evict_stale(now_ms, self.config.window.max_age_ms)
    }

    pub fn snapshot(&self) -> Vec<ObservationEntry> {
        self.window().snapshot()
    }

    /// Drop stale entries and take a snapshot under a single lock.
    /// Returns the number evicted alongside the snapshot.
    pub fn evict_and_snapshot(&self, now_ms: i64) -> (usize, Vec<ObservationEntry>) {
        let mut window = self.window();
        let evicted = window.evict_stale(now_ms, self.config.window.max_age_ms);
        (evicted, window.snapshot())
    }

    /// Look up every beacon in `snapshot` and fuse.
    ///
    /// Directory errors abort the cycle; unknown beacons do not.
    pub async fn resolve_and_fuse(
        &self,
        user_id: &str,
        snapshot: &[ObservationEntry],
        viewers: &BTreeSet<String>,
        directory: &dyn BeaconDirectory,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LocationEstimate>> {
        let mut resolved = HashMap::with_capacity(snapshot.len());
        for entry in snapshot {
            let record = directory.lookup(&entry.beacon_id).await.with_context(|| {
                format!("beacon directory lookup failed for {}", entry.beacon_id)
            })?;
            if let Some(record) = record {
                resolved.insert(entry.beacon_id.clone(), record);
            }
        }

        Ok(self.fusion.fuse(
            user_id,
            snapshot,
            |id| resolved.get(id).cloned(),
            viewers,
            updated_at,
        ))
    }

    /// Produce the current estimate for `user_id`, if any beacon resolves.
    ///
    /// `now_ms` is in the same time base as sighting timestamps and only
    /// drives staleness; `updated_at` stamps the estimate.
    pub async fn estimate(
        &self,
        user_id: &str,
        viewers: &BTreeSet<String>,
        directory: &dyn BeaconDirectory,
        now_ms: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LocationEstimate>> {
        let (_, snapshot) = self.evict_and_snapshot(now_ms);
        self.resolve_and_fuse(user_id, &snapshot, viewers, directory, updated_at)
            .await
    }

    /// Estimate and hand the result to `publisher`. Nothing is published when
    /// there is no anchor. Publish failures are returned, not retried.
    pub async fn estimate_and_publish(
        &self,
        user_id: &str,
        viewers: &BTreeSet<String>,
        directory: &dyn BeaconDirectory,
        publisher: &dyn LocationPublisher,
        now_ms: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LocationEstimate>, CycleError> {
        let (_, snapshot) = self.evict_and_snapshot(now_ms);
        self.publish_snapshot(user_id, &snapshot, viewers, directory, publisher, updated_at)
            .await
    }

    /// Fuse an already-taken snapshot and publish the result.
    pub async fn publish_snapshot(
        &self,
        user_id: &str,
        snapshot: &[ObservationEntry],
        viewers: &BTreeSet<String>,
        directory: &dyn BeaconDirectory,
        publisher: &dyn LocationPublisher,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LocationEstimate>, CycleError> {
        let estimate = self
            .resolve_and_fuse(user_id, snapshot, viewers, directory, updated_at)
            .await
            .map_err(CycleError::Directory)?;
        let Some(estimate) = estimate else {
            return Ok(None);
        };

        publisher
            .publish(user_id, &estimate)
            .await
            .with_context(|| format!("failed to publish location for {user_id}"))
            .map_err(CycleError::Publish)?;

        log_info!(
            "published location for {} at beacon {} (radius {:.1}m, {} beacons)",
            user_id,
            estimate.anchor_beacon_id,
            estimate.radius_m,
            snapshot.len()
        );
        Ok(Some(estimate))
    }
}

/// A fusion cycle that could not complete.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Directory(anyhow::Error),
    #[error(transparent)]
    Publish(anyhow::Error),
}
