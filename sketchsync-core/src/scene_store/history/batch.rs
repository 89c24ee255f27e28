/*
    batch.rs - Reversible change batches

    A batch is one undo/redo unit: per element, the snapshot before the
    batch and the snapshot after it. Snapshots are Arc clones of store
    records, so they stay valid whatever happens to live state.

    Inverting a batch never replaces a record wholesale. Only the payload
    fields and tombstone flag the batch actually changed are moved back
    (or forward), on top of whatever the element looks like now. Fields
    edited concurrently by peers are left alone.
*/

use crate::scene_store::model::{Element, ElementId, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Direction a batch is replayed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Toward the pre-batch state (undo)
    Backward,
    /// Toward the post-batch state (redo)
    Forward,
}

/// Change of one element inside a batch
#[derive(Debug, Clone)]
pub struct ElementDelta {
    pub id: ElementId,

    /// State before the batch; `None` when the batch created the element
    pub pre: Option<Arc<Element>>,

    /// State after the batch
    pub post: Arc<Element>,
}

/// Field-level target a delta moves an element toward
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeltaTarget {
    /// Field values to write; `None` drops the field
    pub fields: Vec<(String, Option<FieldValue>)>,

    /// Tombstone flag to write, when the batch changed it
    pub deleted: Option<bool>,
}

impl DeltaTarget {
    /// Apply onto a copy of `element`
    pub fn apply_to(&self, element: &mut Element) {
        for (key, value) in &self.fields {
            element.payload.put(key, value.clone());
        }
        if let Some(deleted) = self.deleted {
            element.deleted = deleted;
        }
    }

    /// Whether applying to `current` would change anything
    pub fn changes(&self, current: &Element) -> bool {
        let deleted_differs = self.deleted.map(|d| d != current.deleted).unwrap_or(false);
        deleted_differs
            || self
                .fields
                .iter()
                .any(|(key, value)| current.payload.get(key) != value.as_ref())
    }
}

impl ElementDelta {
    pub fn new(pre: Option<Arc<Element>>, post: Arc<Element>) -> Self {
        ElementDelta { id: post.id.clone(), pre, post }
    }

    /// Payload fields the batch touched
    pub fn touched_fields(&self) -> BTreeSet<String> {
        match &self.pre {
            Some(pre) => pre.payload.changed_fields(&self.post.payload),
            None => self.post.payload.iter().map(|(k, _)| k.clone()).collect(),
        }
    }

    /// Whether the delta changes anything at all
    pub fn is_effective(&self) -> bool {
        match &self.pre {
            Some(pre) => pre.deleted != self.post.deleted || pre.payload != self.post.payload,
            None => true,
        }
    }

    /// What the element must look like, field by field, after replaying
    /// this delta in `direction`
    pub fn target(&self, direction: Direction) -> DeltaTarget {
        let post = &self.post;
        match (&self.pre, direction) {
            // Undoing a creation tombstones the element and leaves its payload
            (None, Direction::Backward) => DeltaTarget { fields: Vec::new(), deleted: Some(true) },
            (None, Direction::Forward) => DeltaTarget {
                fields: post.payload.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect(),
                deleted: Some(post.deleted),
            },
            (Some(pre), direction) => {
                let source = match direction {
                    Direction::Backward => pre,
                    Direction::Forward => post,
                };
                let fields = pre
                    .payload
                    .changed_fields(&post.payload)
                    .into_iter()
                    .map(|key| {
                        let value = source.payload.get(&key).cloned();
                        (key, value)
                    })
                    .collect();
                let deleted = (pre.deleted != post.deleted).then_some(source.deleted);
                DeltaTarget { fields, deleted }
            }
        }
    }

    /// Fold a later delta of the same element into this one: the
    /// pre-snapshot stays, the post-snapshot moves
    pub fn extend(&mut self, later: ElementDelta) {
        debug_assert_eq!(self.id, later.id);
        self.post = later.post;
    }
}

/// One committed undo/redo unit
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub id: u64,
    pub deltas: Vec<ElementDelta>,

    /// Elements of this batch that peers edited after it was recorded
    pub remote_touched: BTreeSet<ElementId>,
}

impl ChangeBatch {
    pub fn new(id: u64, deltas: Vec<ElementDelta>) -> Self {
        ChangeBatch { id, deltas, remote_touched: BTreeSet::new() }
    }

    pub fn element_ids(&self) -> BTreeSet<ElementId> {
        self.deltas.iter().map(|d| d.id.clone()).collect()
    }

    pub fn touches(&self, id: &ElementId) -> bool {
        self.deltas.iter().any(|d| &d.id == id)
    }

    /// Drop deltas that change nothing
    pub fn prune(&mut self) {
        self.deltas.retain(ElementDelta::is_effective);
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}
