/*
    Scene store - Versioned element state for collaborative drawing

    Every element is a last-writer-wins register ordered by
    (version, tie_break). Local edits always win locally and bump the
    version; remote records go through the resolver. On top sits a
    coalesced undo/redo history that replays through the same local write
    path, so undo is just another edit to peers.

    Layout:
    - model:   element records and payload values
    - crdt:    version stamps and the resolution rule
    - store:   element arena, change records, snapshots
    - history: change batches, undo/redo, debounce timer
    - sync:    wire format, incoming application, outbox
    - scene:   the session handle tying it together
*/

pub mod crdt;
pub mod history;
pub mod model;
pub mod scene;
pub mod store;
pub mod sync;

#[cfg(test)]
mod tests;

pub use crdt::{Resolution, VersionAllocator, VersionStamp};
pub use history::{HistoryOutcome, RecordMode, RecordOutcome};
pub use model::{Element, ElementId, ElementKind, FieldValue, Payload};
pub use scene::{ChangeNotification, Scene};
pub use store::{ChangeKind, ChangeOrigin, SnapshotManager, StoreError, StoreResult};
pub use sync::{ApplyOutcome, IncomingOutcome, RejectReason};
