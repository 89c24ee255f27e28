/*
    Sync subsystem - Exchange of element records with peers

    Transport is somebody else's job: this module turns store records into
    bytes and bytes back into resolved store writes.
*/

pub mod gateway;
pub mod message;
pub mod outbox;

pub use gateway::{apply_incoming, apply_message, encode_outgoing, ApplyOutcome, IncomingOutcome, RejectReason};
pub use message::{MessageKind, SyncMessage, FORMAT_VERSION};
pub use outbox::{spawn_flusher, Outbox, DEFAULT_MAX_ELEMENTS_PER_MESSAGE};
