use crate::models::ObservationEntry;

use super::config::{RadiusConfig, SignalModelConfig};

/// Estimate distance in meters from a received signal strength.
///
/// Log-distance path loss: `10 ^ ((P_1m - rssi) / (10 * n))`.
pub fn distance_from_rssi(rssi: i32, model: &SignalModelConfig) -> f64 {
    let exponent =
        (model.measured_power_at_1m - f64::from(rssi)) / (10.0 * model.path_loss_exponent);
    10_f64.powf(exponent)
}

/// Uncertainty radius from a set of per-beacon distance estimates.
///
/// Nearest distance plus a margin that shrinks when more than one beacon
/// corroborates, never below the configured floor.
pub fn radius_from_distances(distances: &[f64], config: &RadiusConfig) -> f64 {
    let Some(nearest) = distances.iter().copied().reduce(f64::min) else {
        return config.default_radius_m;
    };

    let margin = if distances.len() >= 2 {
        config.corroborated_margin_m
    } else {
        config.single_margin_m
    };

    (nearest + margin).max(config.min_radius_m)
}

/// Uncertainty radius over observation entries. Entries that have no
/// distance yet are estimated from their RSSI.
pub fn radius_from_entries(
    entries: &[ObservationEntry],
    model: &SignalModelConfig,
    config: &RadiusConfig,
) -> f64 {
    let distances: Vec<f64> = entries
        .iter()
        .map(|entry| {
            entry
                .distance_m
                .unwrap_or_else(|| distance_from_rssi(entry.rssi, model))
        })
        .collect();
    radius_from_distances(&distances, config)
}
