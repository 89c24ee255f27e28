/*
    Store subsystem - Element records and their persistence
*/

pub mod element_store;
pub mod errors;
pub mod events;
pub mod snapshot;

pub use element_store::ElementStore;
pub use errors::*;
pub use events::{ChangeKind, ChangeOrigin, StoreChange};
pub use snapshot::{LoadReport, Snapshot, SnapshotManager, SnapshotMetadata};
