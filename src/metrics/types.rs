use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleOutcome {
    Published,
    /// No beacon in the window resolved in the directory.
    NoAnchor,
    DirectoryFailed,
    PublishFailed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetrics {
    pub timestamp: DateTime<Utc>,
    pub window_size: usize,
    pub evicted_stale: usize,
    pub outcome: CycleOutcome,
    pub radius_m: Option<f64>,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub accepted_count: u64,
    /// Rejections keyed by reason label.
    pub rejected: BTreeMap<String, u64>,
    pub capacity_evictions: u64,
    pub cycle_count: u64,
    pub publish_count: u64,
    pub failure_count: u64,
    pub recent_cycles: Vec<CycleMetrics>,
}
