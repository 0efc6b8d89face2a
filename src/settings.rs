use anyhow::{Context, Result};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::positioning::PositioningConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Persisted positioning configuration.
///
/// Missing fields fall back to defaults; a corrupt or invalid file is
/// ignored with a warning so the app still starts.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PositioningConfig>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_settings(&contents).unwrap_or_else(|err| {
                log_warn!("Ignoring settings at {}: {err:#}", path.display());
                PositioningConfig::default()
            })
        } else {
            PositioningConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, PositioningConfig> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PositioningConfig> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn positioning(&self) -> PositioningConfig {
        self.read().clone()
    }

    pub fn update_positioning(&self, config: PositioningConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self.write();
        self.persist(&config)?;
        *guard = config;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data = parse_settings(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &PositioningConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn parse_settings(contents: &str) -> Result<PositioningConfig> {
    let config: PositioningConfig =
        serde_json::from_str(contents).context("settings are not valid JSON")?;
    config.validate()?;
    Ok(config)
}
