//! Metrics for the scene engine
//!
//! Counters go to whatever `metrics` recorder the host installed (none is
//! a no-op). `SceneMetrics` keeps per-scene totals that can be read back
//! without a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

mod collector;

pub use collector::{SceneMetrics, SceneMetricsSnapshot};

/// Register descriptions for every metric the engine emits
pub fn init_metrics() {
    // Store
    describe_counter!("scene.store.writes.local", "Local element writes, undo and redo included");
    describe_counter!("scene.store.remote.applied", "Remote records that replaced the local one");
    describe_counter!("scene.store.remote.merged", "Remote records already held (retransmissions)");
    describe_counter!("scene.store.remote.rejected", "Stale remote records");
    describe_gauge!("scene.store.elements", "Records in the store, tombstones included");

    // History
    describe_counter!("scene.history.undo", "Undo operations with a visible effect");
    describe_counter!("scene.history.redo", "Redo operations with a visible effect");
    describe_counter!("scene.history.evicted", "Batches dropped at capacity");

    // Sync
    describe_counter!("scene.sync.messages.in", "Sync messages decoded");
    describe_counter!("scene.sync.messages.out", "Sync messages produced by the outbox");
    describe_counter!("scene.sync.malformed", "Incoming elements rejected as malformed");

    // Snapshots
    describe_histogram!("scene.snapshot.save_ms", "Snapshot write duration in milliseconds");
    describe_histogram!("scene.snapshot.load_ms", "Snapshot replay duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a gauge metric
pub fn record_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Measures an operation and records it as a histogram in milliseconds
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) -> f64 {
        let millis = self.start.elapsed().as_secs_f64() * 1000.0;
        record_histogram(self.name, millis);
        millis
    }
}
