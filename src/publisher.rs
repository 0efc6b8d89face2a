//! Location publisher seam and the local SQLite-backed implementation.

use anyhow::{ensure, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::db::Database;
use crate::models::LocationEstimate;

const FEED_CAPACITY: usize = 64;

/// Persists a user's live location and fans it out to authorized viewers.
///
/// Publishing is an upsert keyed by user id, so repeating a call is harmless.
/// Failures are returned to the caller, who decides whether to try again.
#[async_trait]
pub trait LocationPublisher: Send + Sync {
    async fn publish(&self, user_id: &str, estimate: &LocationEstimate) -> Result<()>;
}

/// Publishes into the local database and a realtime broadcast feed.
#[derive(Clone)]
pub struct LocalPublisher {
    db: Database,
    feed: broadcast::Sender<LocationEstimate>,
}

impl LocalPublisher {
    pub fn new(db: Database) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { db, feed }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Realtime updates that `viewer_id` is allowed to see.
    pub fn subscribe(&self, viewer_id: impl Into<String>) -> ViewerSubscription {
        ViewerSubscription {
            viewer_id: viewer_id.into(),
            rx: self.feed.subscribe(),
        }
    }
}

#[async_trait]
impl LocationPublisher for LocalPublisher {
    async fn publish(&self, user_id: &str, estimate: &LocationEstimate) -> Result<()> {
        ensure!(
            estimate.user_id == user_id,
            "estimate belongs to {} but was published for {user_id}",
            estimate.user_id
        );

        self.db.upsert_location(estimate).await?;

        // No subscribers is fine; the row is already stored.
        let _ = self.feed.send(estimate.clone());
        Ok(())
    }
}

pub struct ViewerSubscription {
    viewer_id: String,
    rx: broadcast::Receiver<LocationEstimate>,
}

impl ViewerSubscription {
    /// Next estimate visible to this viewer, or `None` once the publisher is gone.
    ///
    /// A viewer that falls behind skips the updates it missed; only the
    /// latest location of each user matters.
    pub async fn recv(&mut self) -> Option<LocationEstimate> {
        loop {
            match self.rx.recv().await {
                Ok(estimate) if estimate.is_visible_to(&self.viewer_id) => return Some(estimate),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("viewer {} skipped {skipped} location updates", self.viewer_id);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
