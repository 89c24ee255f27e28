/*
    CRDT subsystem - Per-element last-writer-wins registers

    Version allocation for local writes and the resolution rule applied to
    remote records.
*/

pub mod resolver;
pub mod version;

pub use resolver::{resolve, winner, Resolution};
pub use version::{VersionAllocator, VersionStamp, INITIAL_VERSION};
