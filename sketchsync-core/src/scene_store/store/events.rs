/*
    events.rs - Store change records

    Every successful write yields one StoreChange. The scene turns them into
    notifications for the renderer and dirty marks for the outbox; receivers
    must tolerate duplicates.
*/

use crate::scene_store::model::{Element, ElementId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What happened to an element, from the renderer's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Classify a write from the liveness of the previous and next record
    pub fn between(previous: Option<&Element>, next: &Element) -> Self {
        match (previous.map(Element::is_live), next.is_live()) {
            (None, true) | (Some(false), true) => ChangeKind::Created,
            (None, false) | (Some(true), false) => ChangeKind::Deleted,
            (Some(true), true) | (Some(false), false) => ChangeKind::Updated,
        }
    }
}

/// Who authored a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOrigin {
    /// Local user edit, undo or redo
    Local,
    /// Record received from a peer or replayed from a snapshot
    Remote,
}

/// A single element change emitted by the store
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub element_id: ElementId,
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
    pub snapshot: Arc<Element>,
}

impl StoreChange {
    pub fn new(kind: ChangeKind, origin: ChangeOrigin, snapshot: Arc<Element>) -> Self {
        StoreChange { element_id: snapshot.id.clone(), kind, origin, snapshot }
    }

    pub fn is_local(&self) -> bool {
        self.origin == ChangeOrigin::Local
    }
}
