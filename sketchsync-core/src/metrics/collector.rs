//! Per-scene counters

use crate::scene_store::crdt::Resolution;
use crate::scene_store::history::HistoryOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic totals for one scene
#[derive(Debug, Default)]
pub struct SceneMetrics {
    local_writes: AtomicU64,
    remote_applied: AtomicU64,
    remote_merged: AtomicU64,
    remote_rejected: AtomicU64,
    malformed: AtomicU64,
    undos: AtomicU64,
    redos: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
}

/// Point-in-time copy of `SceneMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneMetricsSnapshot {
    pub local_writes: u64,
    pub remote_applied: u64,
    pub remote_merged: u64,
    pub remote_rejected: u64,
    pub malformed: u64,
    pub undos: u64,
    pub redos: u64,
    pub messages_in: u64,
    pub messages_out: u64,
}

impl SceneMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_local_writes(&self, count: u64) {
        self.local_writes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_resolution(&self, resolution: Resolution) {
        let counter = match resolution {
            Resolution::Applied => &self.remote_applied,
            Resolution::Merged => &self.remote_merged,
            Resolution::Rejected => &self.remote_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an undo or redo that had an effect
    pub fn inc_history(&self, outcome: &HistoryOutcome) {
        match outcome {
            HistoryOutcome::AppliedInverse(_) => self.undos.fetch_add(1, Ordering::Relaxed),
            HistoryOutcome::AppliedForward(_) => self.redos.fetch_add(1, Ordering::Relaxed),
            HistoryOutcome::Empty => 0,
        };
    }

    pub fn inc_messages_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_messages_out(&self, count: u64) {
        self.messages_out.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SceneMetricsSnapshot {
        SceneMetricsSnapshot {
            local_writes: self.local_writes.load(Ordering::Relaxed),
            remote_applied: self.remote_applied.load(Ordering::Relaxed),
            remote_merged: self.remote_merged.load(Ordering::Relaxed),
            remote_rejected: self.remote_rejected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            undos: self.undos.load(Ordering::Relaxed),
            redos: self.redos.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_resolutions() {
        let metrics = SceneMetrics::new();
        metrics.inc_resolution(Resolution::Applied);
        metrics.inc_resolution(Resolution::Applied);
        metrics.inc_resolution(Resolution::Rejected);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.remote_applied, 2);
        assert_eq!(snapshot.remote_merged, 0);
        assert_eq!(snapshot.remote_rejected, 1);
    }

    #[test]
    fn test_empty_history_outcome_is_not_counted() {
        let metrics = SceneMetrics::new();
        metrics.inc_history(&HistoryOutcome::Empty);
        assert_eq!(metrics.snapshot(), SceneMetricsSnapshot::default());
    }
}
