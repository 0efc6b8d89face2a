use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Service identifier our campus beacons advertise their room tag under.
pub const DEFAULT_SERVICE_MARKER: &str = "0000feaa-0000-1000-8000-00805f9b34fb";

/// Payload written to beacons that have not been assigned a room yet.
pub const PLACEHOLDER_PAYLOAD: &str = "none";

/// Thresholds for accepting a raw advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    /// Weakest signal (dBm) still considered usable.
    pub min_rssi: i32,
    pub service_marker: String,
    pub placeholder_payload: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_rssi: -80,
            service_marker: DEFAULT_SERVICE_MARKER.to_string(),
            placeholder_payload: PLACEHOLDER_PAYLOAD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowConfig {
    pub capacity: usize,
    /// Entries older than this are dropped before every fusion cycle.
    pub max_age_ms: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_age_ms: 30_000,
        }
    }
}

/// Log-distance path-loss parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignalModelConfig {
    /// Expected RSSI at one meter from the beacon.
    pub measured_power_at_1m: f64,
    pub path_loss_exponent: f64,
}

impl Default for SignalModelConfig {
    fn default() -> Self {
        Self {
            measured_power_at_1m: -59.0,
            path_loss_exponent: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RadiusConfig {
    /// Reported when there is nothing to go on.
    pub default_radius_m: f64,
    /// Added when two or more beacons corroborate the reading.
    pub corroborated_margin_m: f64,
    /// Added when only one beacon is heard.
    pub single_margin_m: f64,
    pub min_radius_m: f64,
}

impl Default for RadiusConfig {
    fn default() -> Self {
        Self {
            default_radius_m: 50.0,
            corroborated_margin_m: 5.0,
            single_margin_m: 15.0,
            min_radius_m: 5.0,
        }
    }
}

/// Scheduling knobs for the host-side tracking loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingConfig {
    pub fusion_interval_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            fusion_interval_ms: 5_000,
            publish_timeout_ms: 10_000,
        }
    }
}

/// Complete tunable configuration for the positioning pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PositioningConfig {
    pub filter: FilterConfig,
    pub window: WindowConfig,
    pub signal: SignalModelConfig,
    pub radius: RadiusConfig,
    pub tracking: TrackingConfig,
}

impl PositioningConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.window.capacity > 0, "window capacity must be at least 1");
        ensure!(self.window.max_age_ms > 0, "staleness horizon must be positive");
        ensure!(
            self.signal.path_loss_exponent > 0.0,
            "path-loss exponent must be positive (got {})",
            self.signal.path_loss_exponent
        );
        ensure!(
            self.radius.min_radius_m > 0.0,
            "minimum radius must be positive (got {})",
            self.radius.min_radius_m
        );
        ensure!(
            !self.filter.service_marker.trim().is_empty(),
            "service marker must not be empty"
        );
        ensure!(
            self.tracking.fusion_interval_ms > 0,
            "fusion interval must be positive"
        );
        ensure!(
            self.tracking.publish_timeout_ms > 0,
            "publish timeout must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PositioningConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PositioningConfig =
            serde_json::from_str(r#"{"filter":{"minRssi":-70},"window":{"capacity":4}}"#).unwrap();

        assert_eq!(config.filter.min_rssi, -70);
        assert_eq!(config.filter.placeholder_payload, "none");
        assert_eq!(config.window.capacity, 4);
        assert_eq!(config.window.max_age_ms, 30_000);
        assert_eq!(config.signal, SignalModelConfig::default());
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = PositioningConfig::default();
        config.window.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_radius_floor() {
        let mut config = PositioningConfig::default();
        config.radius.min_radius_m = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_publish_timeout() {
        let mut config = PositioningConfig::default();
        config.tracking.publish_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
