mod types;

pub use types::{CycleMetrics, CycleOutcome, MetricsSnapshot};

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::positioning::RejectReason;

const MAX_RECENT_CYCLES: usize = 20;

/// Counters for the positioning pipeline, shared between the scan callback
/// and the fusion loop.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    accepted_count: u64,
    rejected: BTreeMap<RejectReason, u64>,
    capacity_evictions: u64,
    cycle_count: u64,
    publish_count: u64,
    failure_count: u64,
    recent_cycles: VecDeque<CycleMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MetricsState> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record_accepted(&self, evicted_for_capacity: bool) {
        let mut state = self.state();
        state.accepted_count += 1;
        if evicted_for_capacity {
            state.capacity_evictions += 1;
        }
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        *self.state().rejected.entry(reason).or_insert(0) += 1;
    }

    pub fn record_cycle(&self, metrics: CycleMetrics) {
        let mut state = self.state();

        state.cycle_count += 1;
        match metrics.outcome {
            CycleOutcome::Published => state.publish_count += 1,
            CycleOutcome::NoAnchor => {}
            CycleOutcome::DirectoryFailed
            | CycleOutcome::PublishFailed
            | CycleOutcome::TimedOut => state.failure_count += 1,
        }

        state.recent_cycles.push_back(metrics);
        if state.recent_cycles.len() > MAX_RECENT_CYCLES {
            state.recent_cycles.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state();
        MetricsSnapshot {
            accepted_count: state.accepted_count,
            rejected: state
                .rejected
                .iter()
                .map(|(reason, count)| (reason.as_str().to_string(), *count))
                .collect(),
            capacity_evictions: state.capacity_evictions,
            cycle_count: state.cycle_count,
            publish_count: state.publish_count,
            failure_count: state.failure_count,
            recent_cycles: state.recent_cycles.iter().cloned().collect(),
        }
    }

    pub fn reset(&self) {
        *self.state() = MetricsState::default();
    }
}
