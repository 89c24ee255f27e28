/*
    element_store.rs - Arena of element records keyed by id

    Holds exactly one record per id. Records are immutable Arc snapshots:
    a write builds a new record and swaps the Arc, so history batches and
    readers that hold older snapshots never alias live state.

    Two write paths:
    - local (create/update/delete/restore): always succeeds over whatever
      version is stored, stamping the next version
    - remote (apply_remote): goes through the LWW resolver

    Records are never removed, only tombstoned, so a tombstone keeps its
    stamp to win or lose against late messages.

    Local writes refuse payloads that would not survive the wire (reserved
    field names, non-finite numbers) and leave the store untouched.
*/

use crate::metrics::record_counter;
use crate::scene_store::crdt::{resolve, Resolution, VersionAllocator};
use crate::scene_store::model::{Element, ElementId, ElementKind, Payload};
use crate::scene_store::store::errors::{StoreError, StoreResult};
use crate::scene_store::store::events::{ChangeKind, ChangeOrigin, StoreChange};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Authoritative element collection of one scene
#[derive(Debug, Default)]
pub struct ElementStore {
    records: BTreeMap<ElementId, Arc<Element>>,
    allocator: VersionAllocator,

    /// Changes produced since the last drain
    changes: Vec<StoreChange>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store using the given allocator (seeded allocators make tests
    /// reproducible)
    pub fn with_allocator(allocator: VersionAllocator) -> Self {
        ElementStore { records: BTreeMap::new(), allocator, changes: Vec::new() }
    }

    /// Create an element at version 1.
    ///
    /// A tombstoned id is resurrected at its next version so versions never
    /// move backwards.
    pub fn create(
        &mut self,
        id: ElementId,
        kind: ElementKind,
        payload: Payload,
    ) -> StoreResult<Arc<Element>> {
        check_payload(&id, &payload)?;
        let previous = self.records.get(&id).cloned();

        let stamp = match previous.as_deref() {
            Some(existing) if existing.is_live() => {
                return Err(StoreError::DuplicateId(id.to_string()));
            }
            Some(tombstone) => self.allocator.next(tombstone.version),
            None => self.allocator.initial(),
        };

        let element = Element::new(id, kind, payload, stamp);
        debug!(id = %element.id, kind = %element.kind, stamp = %stamp, "element created");
        Ok(self.commit(previous.as_deref(), element, ChangeOrigin::Local))
    }

    /// Get the current record of an element, tombstones included
    pub fn get(&self, id: &ElementId) -> StoreResult<Arc<Element>> {
        self.records.get(id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Apply a local payload mutation and stamp the next version
    pub fn update<F>(&mut self, id: &ElementId, mutation: F) -> StoreResult<Arc<Element>>
    where
        F: FnOnce(&mut Payload),
    {
        self.write_local(id, |element| mutation(&mut element.payload))
    }

    /// Tombstone an element. Goes through the same versioned write path as
    /// any other local mutation.
    pub fn delete(&mut self, id: &ElementId) -> StoreResult<Arc<Element>> {
        self.write_local(id, |element| element.deleted = true)
    }

    /// Clear the tombstone of an element
    pub fn restore(&mut self, id: &ElementId) -> StoreResult<Arc<Element>> {
        self.write_local(id, |element| element.deleted = false)
    }

    /// Local write over the current record: copy, mutate, restamp, swap.
    ///
    /// The closure may touch the payload and the tombstone flag; identity
    /// and kind are restored afterwards.
    pub(crate) fn write_local<F>(&mut self, id: &ElementId, mutate: F) -> StoreResult<Arc<Element>>
    where
        F: FnOnce(&mut Element),
    {
        let current = self.get(id)?;
        let mut next = Element::clone(&current);
        mutate(&mut next);
        next.id = current.id.clone();
        next.kind = current.kind;
        check_payload(id, &next.payload)?;

        let stamp = self.allocator.next(current.version);
        next.restamp(stamp);

        debug!(id = %id, stamp = %stamp, deleted = next.deleted, "local write");
        record_counter("scene.store.writes.local", 1);
        Ok(self.commit(Some(current.as_ref()), next, ChangeOrigin::Local))
    }

    /// Apply a record received from a peer or a snapshot.
    ///
    /// Never fails: the resolver decides whether the candidate replaces the
    /// local record, is a retransmission, or is stale.
    pub fn apply_remote(&mut self, candidate: Element) -> Resolution {
        let previous = self.records.get(&candidate.id).cloned();
        let resolution = resolve(previous.as_deref(), &candidate);

        match resolution {
            Resolution::Applied => {
                trace!(id = %candidate.id, stamp = %candidate.stamp(), "remote record applied");
                self.commit(previous.as_deref(), candidate, ChangeOrigin::Remote);
                record_counter("scene.store.remote.applied", 1);
            }
            Resolution::Merged => {
                // Already held: the existing snapshot is re-announced so
                // subscribers can treat delivery as idempotent
                if let Some(existing) = previous {
                    let kind = ChangeKind::between(Some(existing.as_ref()), &existing);
                    self.changes.push(StoreChange::new(kind, ChangeOrigin::Remote, existing));
                }
                record_counter("scene.store.remote.merged", 1);
            }
            Resolution::Rejected => {
                trace!(id = %candidate.id, stamp = %candidate.stamp(), "stale remote record");
                record_counter("scene.store.remote.rejected", 1);
            }
        }

        resolution
    }

    fn commit(
        &mut self,
        previous: Option<&Element>,
        next: Element,
        origin: ChangeOrigin,
    ) -> Arc<Element> {
        let kind = ChangeKind::between(previous, &next);
        let next = Arc::new(next);
        self.records.insert(next.id.clone(), Arc::clone(&next));
        self.changes.push(StoreChange::new(kind, origin, Arc::clone(&next)));
        next
    }

    /// Iterate records matching `predicate`, in id order
    pub fn list<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = Arc<Element>> + 'a
    where
        P: Fn(&Element) -> bool + 'a,
    {
        self.records.values().filter(move |e| predicate(e)).cloned()
    }

    /// Cheap copy of every record (Arc clones), tombstones included
    pub fn snapshot(&self) -> Vec<Arc<Element>> {
        self.records.values().cloned().collect()
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.records.contains_key(id)
    }

    /// Whether `id` exists and is not tombstoned
    pub fn is_live(&self, id: &ElementId) -> bool {
        self.records.get(id).map(|e| e.is_live()).unwrap_or(false)
    }

    /// Ids referenced by `id` (bindings, container) that are missing or
    /// tombstoned. Integrity is left to the caller.
    pub fn dangling_references(&self, id: &ElementId) -> StoreResult<Vec<ElementId>> {
        let element = self.get(id)?;
        Ok(element.referenced_ids().into_iter().filter(|r| !self.is_live(r)).collect())
    }

    /// Take every change produced since the last call
    pub fn drain_changes(&mut self) -> Vec<StoreChange> {
        std::mem::take(&mut self.changes)
    }

    /// Number of records, tombstones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.records.values().filter(|e| e.is_live()).count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.records.len() - self.live_count()
    }
}

fn check_payload(id: &ElementId, payload: &Payload) -> StoreResult<()> {
    payload
        .validate()
        .map_err(|reason| StoreError::MalformedElement(format!("{} on {}", reason, id)))
}
