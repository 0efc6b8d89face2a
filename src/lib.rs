pub mod db;
pub mod directory;
pub mod metrics;
pub mod models;
pub mod positioning;
pub mod publisher;
pub mod sensing;
pub mod settings;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

pub use db::Database;
pub use directory::{BeaconDirectory, StaticDirectory};
pub use models::{BeaconRecord, Coordinates, LocationEstimate, ObservationEntry, Sighting};
pub use positioning::{Classification, PositioningConfig, RejectReason};
pub use publisher::{LocalPublisher, LocationPublisher};
pub use sensing::{PositioningEngine, TrackingController};
pub use settings::SettingsStore;
pub use utils::init_logging;

/// Everything a host shell needs to run positioning against local storage.
pub struct LocatorState {
    pub db: Database,
    pub settings: SettingsStore,
    pub engine: PositioningEngine,
    pub publisher: LocalPublisher,
}

impl LocatorState {
    /// Open (or create) the locator's database and settings under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("locator.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("positioning.json"))?;
        let engine = PositioningEngine::new(settings.positioning())?;
        let publisher = LocalPublisher::new(db.clone());

        info!("Locator state ready in {}", data_dir.display());

        Ok(Self {
            db,
            settings,
            engine,
            publisher,
        })
    }

    /// Beacon directory backed by the local database.
    pub fn directory(&self) -> Arc<dyn BeaconDirectory> {
        Arc::new(self.db.clone())
    }

    pub fn publisher(&self) -> Arc<dyn LocationPublisher> {
        Arc::new(self.publisher.clone())
    }
}
