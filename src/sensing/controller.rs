use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::directory::BeaconDirectory;
use crate::models::Sighting;
use crate::publisher::LocationPublisher;

use super::engine::PositioningEngine;
use super::loop_worker::{tracking_loop, wall_clock, ObservationClock, TrackingContext};

const SIGHTING_BUFFER: usize = 256;

/// Host-side scheduler: owns the periodic fusion loop for one user.
///
/// The positioning core itself owns no timers; this controller is the caller
/// that decides when to fuse and publish.
pub struct TrackingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    viewers_tx: Option<watch::Sender<BTreeSet<String>>>,
    clock: ObservationClock,
}

impl TrackingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            viewers_tx: None,
            clock: wall_clock(),
        }
    }

    /// Use `clock` to age observations. It must share the time base of the
    /// sighting timestamps fed to the loop, e.g. milliseconds since boot.
    pub fn with_clock(mut self, clock: ObservationClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the tracking loop. Feed scan results into the returned sender.
    pub fn start_tracking(
        &mut self,
        user_id: String,
        engine: PositioningEngine,
        directory: Arc<dyn BeaconDirectory>,
        publisher: Arc<dyn LocationPublisher>,
        viewers: BTreeSet<String>,
    ) -> Result<mpsc::Sender<Sighting>> {
        if self.handle.is_some() {
            bail!("tracking already active");
        }

        let cancel_token = CancellationToken::new();
        let (sighting_tx, sighting_rx) = mpsc::channel(SIGHTING_BUFFER);
        let (viewers_tx, viewers_rx) = watch::channel(viewers);

        info!("Starting location tracking for {user_id}");
        let ctx = TrackingContext {
            user_id,
            engine,
            directory,
            publisher,
            clock: self.clock.clone(),
        };
        let handle = tokio::spawn(tracking_loop(
            ctx,
            sighting_rx,
            viewers_rx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.viewers_tx = Some(viewers_tx);
        Ok(sighting_tx)
    }

    /// Replace who may see the published location from the next cycle on.
    pub fn update_viewers(&self, viewers: BTreeSet<String>) -> Result<()> {
        let Some(tx) = &self.viewers_tx else {
            bail!("tracking not active");
        };
        tx.send(viewers)
            .context("tracking loop is no longer listening for viewer updates")
    }

    pub async fn stop_tracking(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.viewers_tx = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("tracking loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for TrackingController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::directory::StaticDirectory;
    use crate::metrics::CycleOutcome;
    use crate::models::{BeaconRecord, Coordinates};
    use crate::positioning::config::DEFAULT_SERVICE_MARKER;
    use crate::positioning::PositioningConfig;
    use crate::publisher::LocalPublisher;
    use chrono::Utc;
    use tokio::time::{timeout, Duration};

    fn fast_config() -> PositioningConfig {
        let mut config = PositioningConfig::default();
        config.tracking.fusion_interval_ms = 20;
        config.tracking.publish_timeout_ms = 1_000;
        config
    }

    #[tokio::test]
    async fn publishes_to_viewers_and_stops_cleanly() {
        let engine = PositioningEngine::new(fast_config()).unwrap();
        let directory = Arc::new(StaticDirectory::from_records([BeaconRecord::new(
            "001",
            Coordinates::new(59.0, 18.0),
            Some("4".into()),
        )]));
        let publisher = LocalPublisher::new(Database::in_memory().unwrap());
        let mut friend = publisher.subscribe("friend");

        let mut controller = TrackingController::new();
        let sightings = controller
            .start_tracking(
                "u1".into(),
                engine.clone(),
                directory,
                Arc::new(publisher.clone()),
                BTreeSet::from(["friend".to_string()]),
            )
            .unwrap();
        assert!(controller.is_active());

        sightings
            .send(
                Sighting::new("001", -45, Utc::now().timestamp_millis())
                    .with_service_data(DEFAULT_SERVICE_MARKER, b"be008"),
            )
            .await
            .unwrap();

        let estimate = timeout(Duration::from_secs(5), friend.recv())
            .await
            .expect("estimate within timeout")
            .expect("feed open");
        assert_eq!(estimate.anchor_beacon_id, "001");
        assert_eq!(estimate.floor.as_deref(), Some("4"));

        controller.stop_tracking().await.unwrap();
        assert!(!controller.is_active());
        assert!(controller.update_viewers(BTreeSet::new()).is_err());

        let stored = publisher.database().get_location("u1").await.unwrap();
        assert!(stored.is_some());
        assert!(engine
            .metrics()
            .snapshot()
            .recent_cycles
            .iter()
            .any(|c| c.outcome == CycleOutcome::Published));
    }

    fn library_directory() -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::from_records([BeaconRecord::new(
            "001",
            Coordinates::new(59.0, 18.0),
            None,
        )]))
    }

    #[tokio::test]
    async fn viewer_updates_apply_to_later_cycles() {
        let engine = PositioningEngine::new(fast_config()).unwrap();
        let publisher = LocalPublisher::new(Database::in_memory().unwrap());
        let mut first = publisher.subscribe("a");
        let mut second = publisher.subscribe("b");

        let mut controller = TrackingController::new();
        let sightings = controller
            .start_tracking(
                "u1".into(),
                engine,
                library_directory(),
                Arc::new(publisher.clone()),
                BTreeSet::from(["a".to_string()]),
            )
            .unwrap();
        sightings
            .send(
                Sighting::new("001", -45, Utc::now().timestamp_millis())
                    .with_service_data(DEFAULT_SERVICE_MARKER, b"be008"),
            )
            .await
            .unwrap();

        let before = timeout(Duration::from_secs(5), first.recv())
            .await
            .expect("estimate for a")
            .expect("feed open");
        assert_eq!(before.shared_to, BTreeSet::from(["a".to_string()]));

        controller
            .update_viewers(BTreeSet::from(["b".to_string()]))
            .unwrap();

        let after = timeout(Duration::from_secs(5), second.recv())
            .await
            .expect("estimate for b")
            .expect("feed open");
        assert_eq!(after.shared_to, BTreeSet::from(["b".to_string()]));

        controller.stop_tracking().await.unwrap();
        let stored = publisher
            .database()
            .get_location("u1")
            .await
            .unwrap()
            .expect("stored location");
        assert_eq!(stored.shared_to, BTreeSet::from(["b".to_string()]));
    }

    #[tokio::test]
    async fn boot_relative_timestamps_publish_with_matching_clock() {
        let engine = PositioningEngine::new(fast_config()).unwrap();
        let publisher = LocalPublisher::new(Database::in_memory().unwrap());
        let mut friend = publisher.subscribe("friend");

        let boot = std::time::Instant::now();
        let mut controller = TrackingController::new()
            .with_clock(Arc::new(move || 5_000 + boot.elapsed().as_millis() as i64));
        let sightings = controller
            .start_tracking(
                "u1".into(),
                engine.clone(),
                library_directory(),
                Arc::new(publisher.clone()),
                BTreeSet::from(["friend".to_string()]),
            )
            .unwrap();
        sightings
            .send(
                Sighting::new("001", -45, 5_000)
                    .with_service_data(DEFAULT_SERVICE_MARKER, b"be008"),
            )
            .await
            .unwrap();

        let estimate = timeout(Duration::from_secs(5), friend.recv())
            .await
            .expect("estimate within timeout")
            .expect("feed open");
        assert_eq!(estimate.anchor_beacon_id, "001");

        controller.stop_tracking().await.unwrap();
        assert!(publisher.database().get_location("u1").await.unwrap().is_some());
        assert!(engine
            .metrics()
            .snapshot()
            .recent_cycles
            .iter()
            .all(|c| c.evicted_stale == 0));
    }

    #[tokio::test]
    async fn refuses_double_start() {
        let engine = PositioningEngine::new(fast_config()).unwrap();
        let directory: Arc<dyn BeaconDirectory> = Arc::new(StaticDirectory::new());
        let publisher: Arc<dyn LocationPublisher> =
            Arc::new(LocalPublisher::new(Database::in_memory().unwrap()));

        let mut controller = TrackingController::new();
        controller
            .start_tracking(
                "u1".into(),
                engine.clone(),
                directory.clone(),
                publisher.clone(),
                BTreeSet::new(),
            )
            .unwrap();
        assert!(controller
            .start_tracking("u1".into(), engine, directory, publisher, BTreeSet::new())
            .is_err());

        controller.stop_tracking().await.unwrap();
    }
}
