use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::directory::BeaconDirectory;
use crate::metrics::{CycleMetrics, CycleOutcome};
use crate::models::Sighting;
use crate::publisher::LocationPublisher;

use super::engine::{CycleError, PositioningEngine};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_error, log_info, log_warn};

/// Current time in milliseconds, in the same time base as the host's
/// sighting timestamps (wall clock or monotonic).
pub type ObservationClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Unix-epoch milliseconds, for hosts that stamp sightings with wall time.
pub fn wall_clock() -> ObservationClock {
    Arc::new(|| Utc::now().timestamp_millis())
}

/// Collaborators the loop talks to on every cycle.
#[derive(Clone)]
pub struct TrackingContext {
    pub user_id: String,
    pub engine: PositioningEngine,
    pub directory: Arc<dyn BeaconDirectory>,
    pub publisher: Arc<dyn LocationPublisher>,
    /// Drives staleness only; estimates are always stamped with wall time.
    pub clock: ObservationClock,
}

pub async fn tracking_loop(
    ctx: TrackingContext,
    mut sightings: mpsc::Receiver<Sighting>,
    viewers: watch::Receiver<BTreeSet<String>>,
    cancel_token: CancellationToken,
) {
    let tracking = ctx.engine.config().tracking.clone();
    let mut ticker = tokio::time::interval(Duration::from_millis(tracking.fusion_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let cycle_timeout = Duration::from_millis(tracking.publish_timeout_ms);

    let mut sightings_open = true;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("tracking loop shutting down for {}", ctx.user_id);
                break;
            }
            received = sightings.recv(), if sightings_open => {
                match received {
                    Some(sighting) => {
                        ctx.engine.ingest(&sighting);
                    }
                    None => {
                        log_debug!("sighting source closed for {}", ctx.user_id);
                        sightings_open = false;
                    }
                }
            }
            _ = ticker.tick() => {
                let current_viewers = viewers.borrow().clone();
                run_cycle(&ctx, &current_viewers, cycle_timeout).await;
            }
        }
    }
}

async fn run_cycle(ctx: &TrackingContext, viewers: &BTreeSet<String>, cycle_timeout: Duration) {
    let cycle_start = Instant::now();
    let updated_at = Utc::now();

    let (evicted_stale, snapshot) = ctx.engine.evict_and_snapshot((ctx.clock)());
    let window_size = snapshot.len();

    let publish = ctx.engine.publish_snapshot(
        &ctx.user_id,
        &snapshot,
        viewers,
        ctx.directory.as_ref(),
        ctx.publisher.as_ref(),
        updated_at,
    );

    let (outcome, radius_m) = match tokio::time::timeout(cycle_timeout, publish).await {
        Ok(Ok(Some(estimate))) => (CycleOutcome::Published, Some(estimate.radius_m)),
        Ok(Ok(None)) => {
            log_debug!(
                "no resolvable beacon for {} ({} in window); skipping publish",
                ctx.user_id,
                window_size
            );
            (CycleOutcome::NoAnchor, None)
        }
        Ok(Err(CycleError::Directory(err))) => {
            log_error!("fusion cycle failed for {}: {err:?}", ctx.user_id);
            (CycleOutcome::DirectoryFailed, None)
        }
        Ok(Err(CycleError::Publish(err))) => {
            // The next tick produces a fresh estimate; no retry here.
            log_error!("publishing location failed for {}: {err:?}", ctx.user_id);
            (CycleOutcome::PublishFailed, None)
        }
        Err(_) => {
            log_warn!(
                "fusion cycle timeout (> {}ms) for {}",
                cycle_timeout.as_millis(),
                ctx.user_id
            );
            (CycleOutcome::TimedOut, None)
        }
    };

    ctx.engine.metrics().record_cycle(CycleMetrics {
        timestamp: updated_at,
        window_size,
        evicted_stale,
        outcome,
        radius_m,
        total_ms: cycle_start.elapsed().as_millis() as u64,
    });
}
