//! Spans around the engine's multi-step operations

use std::time::Instant;
use tracing::{span, Level, Span};
use uuid::Uuid;

/// A span with a unique operation id and a start time
pub struct TracedOperation {
    span: Span,
    operation_id: Uuid,
    start: Instant,
}

impl TracedOperation {
    /// Start a new traced operation
    pub fn new(operation_name: &str) -> Self {
        let operation_id = Uuid::new_v4();
        let span = span!(Level::DEBUG, "operation", name = operation_name, id = %operation_id);

        Self { span, operation_id, start: Instant::now() }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record an event in the trace
    pub fn record_event(&self, event: &str) {
        tracing::debug!(parent: &self.span, event = event);
    }

    /// Record an error in the trace
    pub fn record_error(&self, error: &str) {
        tracing::warn!(parent: &self.span, error = error);
    }

    /// Complete the operation and record duration
    pub fn complete(self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            parent: &self.span,
            duration_us = duration.as_micros() as u64,
            "operation completed"
        );
    }
}

/// Trace scene operations
pub mod scene {
    use super::*;

    /// Application of one incoming sync message
    pub fn trace_merge(element_count: usize) -> TracedOperation {
        let op = TracedOperation::new("scene_merge");
        tracing::debug!(parent: &op.span, element_count = element_count);
        op
    }

    pub fn trace_undo() -> TracedOperation {
        TracedOperation::new("scene_undo")
    }

    pub fn trace_redo() -> TracedOperation {
        TracedOperation::new("scene_redo")
    }
}

/// Trace snapshot I/O
pub mod snapshot {
    use super::*;
    use std::path::Path;

    pub fn trace_save(dir: &Path, element_count: usize) -> TracedOperation {
        let op = TracedOperation::new("snapshot_save");
        tracing::debug!(parent: &op.span, dir = %dir.display(), element_count = element_count);
        op
    }

    pub fn trace_load(dir: &Path) -> TracedOperation {
        let op = TracedOperation::new("snapshot_load");
        tracing::debug!(parent: &op.span, dir = %dir.display());
        op
    }
}
