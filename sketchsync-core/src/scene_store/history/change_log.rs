/*
    change_log.rs - Bounded, coalesced undo/redo history

    Batch lifecycle: Open -> Committed.

    - Immediate deltas (creation, deletion, discrete property changes)
      commit synchronously as their own batch. Any open batch is committed
      first; they never merge.
    - Continuable deltas (drags, resizes) open a batch, and later deltas
      for the same element set within the debounce window only move its
      post-snapshots. The batch commits when the window passes without a
      continuation (scheduled task or clock tick).

    The history is a deque plus a cursor: batches[..cursor] are undoable,
    batches[cursor..] are redoable. Committing truncates the redo side;
    overflowing the capacity silently evicts the oldest batch.

    Undo and redo write through the store's local path, so they bump
    versions forward like any other edit and replicate to peers.
*/

use crate::metrics::record_counter;
use crate::scene_store::history::batch::{ChangeBatch, Direction, ElementDelta};
use crate::scene_store::model::{Element, ElementId};
use crate::scene_store::store::element_store::ElementStore;
use crate::scene_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default number of batches kept
pub const DEFAULT_CAPACITY: usize = 100;

/// Default debounce window for continuable edits
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// How a delta is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordMode {
    /// Commit now as its own batch
    Immediate,
    /// Part of a gesture; may be coalesced with following deltas
    Continuable,
}

/// Result of recording deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A batch was committed
    Committed { batch_id: u64 },
    /// Deltas sit in the open batch until the window elapses
    Pending { generation: u64, deadline: Instant },
    /// Nothing effective to record
    Ignored,
}

/// Result of undo or redo
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    /// A batch was replayed backward
    AppliedInverse(AppliedBatch),
    /// A batch was replayed forward
    AppliedForward(AppliedBatch),
    /// Nothing to undo or redo
    Empty,
}

impl HistoryOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, HistoryOutcome::Empty)
    }

    pub fn applied(&self) -> Option<&AppliedBatch> {
        match self {
            HistoryOutcome::AppliedInverse(b) | HistoryOutcome::AppliedForward(b) => Some(b),
            HistoryOutcome::Empty => None,
        }
    }
}

/// Details of a replayed batch
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBatch {
    pub batch_id: u64,

    /// New records written by the replay
    pub elements: Vec<Arc<Element>>,

    /// Elements peers edited after the batch was recorded; their other
    /// fields kept the remote values
    pub rebased: Vec<ElementId>,

    /// Batches passed over because replaying them changed nothing
    pub skipped: usize,
}

/// Counters describing the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub batches: usize,
    pub undoable: usize,
    pub redoable: usize,
    pub open: bool,
    pub evicted: u64,
    pub remote_notes: u64,
}

#[derive(Debug)]
struct OpenBatch {
    batch: ChangeBatch,
    generation: u64,
    deadline: Instant,
}

/// Undo/redo history of one scene
#[derive(Debug)]
pub struct ChangeLog {
    batches: VecDeque<ChangeBatch>,
    cursor: usize,
    capacity: usize,
    debounce: Duration,
    open: Option<OpenBatch>,
    next_batch_id: u64,
    next_generation: u64,
    evicted: u64,
    remote_notes: u64,
}

impl ChangeLog {
    pub fn new(capacity: usize, debounce: Duration) -> Self {
        ChangeLog {
            batches: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
            debounce,
            open: None,
            next_batch_id: 1,
            next_generation: 1,
            evicted: 0,
            remote_notes: 0,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a single element change
    pub fn record(
        &mut self,
        pre: Option<Arc<Element>>,
        post: Arc<Element>,
        mode: RecordMode,
        now: Instant,
    ) -> RecordOutcome {
        self.record_many(vec![ElementDelta::new(pre, post)], mode, now)
    }

    /// Record changes of several elements as one unit
    pub fn record_many(
        &mut self,
        deltas: Vec<ElementDelta>,
        mode: RecordMode,
        now: Instant,
    ) -> RecordOutcome {
        if deltas.is_empty() {
            return RecordOutcome::Ignored;
        }

        match mode {
            RecordMode::Immediate => {
                self.flush();
                let mut batch = ChangeBatch::new(self.allocate_batch_id(), deltas);
                batch.prune();
                if batch.is_empty() {
                    return RecordOutcome::Ignored;
                }
                let batch_id = batch.id;
                self.push_committed(batch);
                RecordOutcome::Committed { batch_id }
            }
            RecordMode::Continuable => {
                let ids: BTreeSet<ElementId> = deltas.iter().map(|d| d.id.clone()).collect();
                let generation = self.allocate_generation();
                let deadline = now + self.debounce;

                if let Some(open) = self.open.as_mut() {
                    if open.batch.element_ids() == ids && now < open.deadline {
                        for delta in deltas {
                            if let Some(existing) =
                                open.batch.deltas.iter_mut().find(|d| d.id == delta.id)
                            {
                                existing.extend(delta);
                            }
                        }
                        open.generation = generation;
                        open.deadline = deadline;
                        trace!(generation, "open batch extended");
                        return RecordOutcome::Pending { generation, deadline };
                    }
                }

                self.flush();
                let batch = ChangeBatch::new(self.allocate_batch_id(), deltas);
                debug!(batch_id = batch.id, generation, "batch opened");
                self.open = Some(OpenBatch { batch, generation, deadline });
                RecordOutcome::Pending { generation, deadline }
            }
        }
    }

    /// Commit the open batch if it still belongs to `generation`.
    ///
    /// Entry point of the scheduled debounce task: a newer continuation or
    /// an immediate commit makes older generations stale.
    pub fn commit_if_current(&mut self, generation: u64) -> Option<u64> {
        match &self.open {
            Some(open) if open.generation == generation => self.flush(),
            _ => None,
        }
    }

    /// Commit the open batch if its window has elapsed at `now`.
    ///
    /// Entry point for callers driving commits from their own clock.
    pub fn commit_expired(&mut self, now: Instant) -> Option<u64> {
        match &self.open {
            Some(open) if now >= open.deadline => self.flush(),
            _ => None,
        }
    }

    /// Commit the open batch now, if any. Returns the committed batch id.
    pub fn flush(&mut self) -> Option<u64> {
        let open = self.open.take()?;
        let mut batch = open.batch;
        batch.prune();
        if batch.is_empty() {
            trace!("open batch had no effect, dropped");
            return None;
        }
        let batch_id = batch.id;
        self.push_committed(batch);
        Some(batch_id)
    }

    /// Generation of the open batch, if any
    pub fn open_generation(&self) -> Option<u64> {
        self.open.as_ref().map(|o| o.generation)
    }

    /// Drop every redoable batch. Called for local writes that are not
    /// recorded, so redo never replays over a newer edit.
    pub fn truncate_redo(&mut self) -> usize {
        let dropped = self.batches.len() - self.cursor;
        if dropped > 0 {
            self.batches.truncate(self.cursor);
            trace!(dropped, "redo side dropped");
        }
        dropped
    }

    fn push_committed(&mut self, batch: ChangeBatch) {
        let dropped_redo = self.truncate_redo();
        debug!(batch_id = batch.id, deltas = batch.deltas.len(), dropped_redo, "batch committed");
        self.batches.push_back(batch);
        self.cursor = self.batches.len();

        while self.batches.len() > self.capacity {
            self.batches.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
            self.evicted += 1;
            record_counter("scene.history.evicted", 1);
        }
    }

    /// Note that a peer changed `id`. Remote changes are never undone by
    /// this replica; batches touching the element are flagged so undo
    /// reports them as rebased.
    pub fn record_remote(&mut self, id: &ElementId) {
        self.remote_notes += 1;
        for batch in self.batches.iter_mut().filter(|b| b.touches(id)) {
            batch.remote_touched.insert(id.clone());
        }
        if let Some(open) = self.open.as_mut() {
            if open.batch.touches(id) {
                open.batch.remote_touched.insert(id.clone());
            }
        }
    }

    /// Undo the latest batch with a visible effect
    pub fn undo(&mut self, store: &mut ElementStore) -> StoreResult<HistoryOutcome> {
        self.flush();
        let mut skipped = 0;

        while self.cursor > 0 {
            let batch = &self.batches[self.cursor - 1];
            let applied = replay(batch, Direction::Backward, store, skipped)?;
            self.cursor -= 1;
            match applied {
                Some(applied) => {
                    record_counter("scene.history.undo", 1);
                    return Ok(HistoryOutcome::AppliedInverse(applied));
                }
                None => skipped += 1,
            }
        }

        Ok(HistoryOutcome::Empty)
    }

    /// Redo the next batch with a visible effect
    pub fn redo(&mut self, store: &mut ElementStore) -> StoreResult<HistoryOutcome> {
        self.flush();
        let mut skipped = 0;

        while self.cursor < self.batches.len() {
            let batch = &self.batches[self.cursor];
            let applied = replay(batch, Direction::Forward, store, skipped)?;
            self.cursor += 1;
            match applied {
                Some(applied) => {
                    record_counter("scene.history.redo", 1);
                    return Ok(HistoryOutcome::AppliedForward(applied));
                }
                None => skipped += 1,
            }
        }

        Ok(HistoryOutcome::Empty)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0 || self.open.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.open.is_none() && self.cursor < self.batches.len()
    }

    /// Number of committed batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.open.is_none()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all batches, open one included
    pub fn clear(&mut self) {
        self.batches.clear();
        self.cursor = 0;
        self.open = None;
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            batches: self.batches.len(),
            undoable: self.cursor,
            redoable: self.batches.len() - self.cursor,
            open: self.open.is_some(),
            evicted: self.evicted,
            remote_notes: self.remote_notes,
        }
    }

    fn allocate_batch_id(&mut self) -> u64 {
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        id
    }

    fn allocate_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_DEBOUNCE)
    }
}

/// Write one batch through the local path. Returns `None` when nothing
/// would change against current state.
///
/// Every element is checked before the first write, so a batch that cannot
/// be replayed fails without touching the store.
fn replay(
    batch: &ChangeBatch,
    direction: Direction,
    store: &mut ElementStore,
    skipped: usize,
) -> StoreResult<Option<AppliedBatch>> {
    let ordered: Vec<&ElementDelta> = match direction {
        Direction::Backward => batch.deltas.iter().rev().collect(),
        Direction::Forward => batch.deltas.iter().collect(),
    };

    let mut planned = Vec::new();
    for delta in ordered {
        let target = delta.target(direction);
        let current = store.get(&delta.id)?;
        if !target.changes(&current) {
            continue;
        }
        let mut preview = Element::clone(&current);
        target.apply_to(&mut preview);
        preview
            .payload
            .validate()
            .map_err(|reason| StoreError::MalformedElement(format!("{} on {}", reason, delta.id)))?;
        planned.push((&delta.id, target));
    }

    if planned.is_empty() {
        trace!(batch_id = batch.id, ?direction, "replay had no effect, skipping");
        return Ok(None);
    }

    let mut elements = Vec::with_capacity(planned.len());
    for (id, target) in planned {
        elements.push(store.write_local(id, |element| target.apply_to(element))?);
    }

    debug!(batch_id = batch.id, ?direction, elements = elements.len(), "batch replayed");
    Ok(Some(AppliedBatch {
        batch_id: batch.id,
        elements,
        rebased: batch.remote_touched.iter().cloned().collect(),
        skipped,
    }))
}
