/*
    History subsystem - Coalesced, reversible change batches

    Only local edits are recorded. Remote changes are noted so undo can
    report batches it replayed over a peer's edits.
*/

pub mod batch;
pub mod change_log;
pub mod scheduler;

pub use batch::{ChangeBatch, DeltaTarget, Direction, ElementDelta};
pub use change_log::{
    AppliedBatch, ChangeLog, HistoryOutcome, HistoryStats, RecordMode, RecordOutcome,
    DEFAULT_CAPACITY, DEFAULT_DEBOUNCE,
};
pub use scheduler::DebounceTimer;
