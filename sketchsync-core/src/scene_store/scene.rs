/*
    scene.rs - Session handle over store, history and outbox

    One Scene per editing session. Cloning the handle shares the session.

    Locking:
    - writes take the write lock for the store mutation, the history entry
      and the outbox mark together, so history never sees a half-applied
      edit
    - reads take the read lock and copy Arc snapshots out
    - notifications go out after the lock is released
    - the debounce task holds only a weak reference and takes the lock to
      commit, never to wait

    Creation, deletion and restore are discrete edits and are recorded in
    history immediately. Plain `update` is not recorded but still clears the
    redo side; `edit` updates and records in one step, `record` lets the
    caller record a write it made.
*/

use crate::config::Config;
use crate::metrics::{record_counter, SceneMetrics, SceneMetricsSnapshot};
use crate::scene_store::crdt::{Resolution, VersionAllocator};
use crate::scene_store::history::{
    ChangeLog, DebounceTimer, ElementDelta, HistoryOutcome, HistoryStats, RecordMode, RecordOutcome,
};
use crate::scene_store::model::{Element, ElementId, ElementKind, Payload};
use crate::scene_store::store::element_store::ElementStore;
use crate::scene_store::store::errors::{StoreError, StoreResult};
use crate::scene_store::store::events::{ChangeKind, ChangeOrigin, StoreChange};
use crate::scene_store::sync::{self, ApplyOutcome, IncomingOutcome, Outbox, RejectReason};
use crate::tracing::scene::{trace_merge, trace_redo, trace_undo};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::LockPoisoned("a thread panicked while holding the scene lock".to_string())
}

/// Change delivered to subscribers
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub element_id: ElementId,
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
    pub snapshot: Arc<Element>,
}

impl From<StoreChange> for ChangeNotification {
    fn from(change: StoreChange) -> Self {
        ChangeNotification {
            element_id: change.element_id,
            kind: change.kind,
            origin: change.origin,
            snapshot: change.snapshot,
        }
    }
}

#[derive(Debug)]
struct SceneState {
    store: ElementStore,
    history: ChangeLog,
    outbox: Outbox,
    timer: DebounceTimer,
}

/// Shared handle to one scene session
#[derive(Debug, Clone)]
pub struct Scene {
    state: Arc<RwLock<SceneState>>,
    notifier: broadcast::Sender<ChangeNotification>,
    metrics: Arc<SceneMetrics>,
    flush_interval: Duration,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        Self::build(config, VersionAllocator::new())
    }

    /// Scene with reproducible version tie-breaks
    pub fn seeded(config: &Config, seed: u64) -> Self {
        Self::build(config, VersionAllocator::seeded(seed))
    }

    fn build(config: &Config, allocator: VersionAllocator) -> Self {
        let (notifier, _) = broadcast::channel(config.notifications.channel_capacity.max(1));
        let state = SceneState {
            store: ElementStore::with_allocator(allocator),
            history: ChangeLog::new(config.history.capacity, config.history.debounce),
            outbox: Outbox::new(config.sync.max_elements_per_message),
            timer: DebounceTimer::new(),
        };
        Scene {
            state: Arc::new(RwLock::new(state)),
            notifier,
            metrics: Arc::new(SceneMetrics::new()),
            flush_interval: config.sync.flush_interval,
        }
    }

    /// Receive every change applied from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifier.subscribe()
    }

    /// Run `f` under the write lock, then publish whatever the store
    /// changed. Local changes are queued for peers.
    fn write<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut SceneState, &Weak<RwLock<SceneState>>) -> StoreResult<R>,
    {
        let weak = Arc::downgrade(&self.state);
        let (result, changes) = {
            let mut state = self.state.write().map_err(handle_poison)?;
            let result = f(&mut *state, &weak);
            let changes = state.store.drain_changes();
            let mut local = 0;
            for change in changes.iter().filter(|c| c.is_local()) {
                state.outbox.mark_dirty(change.element_id.clone());
                local += 1;
            }
            self.metrics.add_local_writes(local);
            (result, changes)
        };

        for change in changes {
            // No subscribers is fine
            let _ = self.notifier.send(ChangeNotification::from(change));
        }
        result
    }

    fn read<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&SceneState) -> StoreResult<R>,
    {
        let state = self.state.read().map_err(handle_poison)?;
        f(&state)
    }

    /// Create an element; recorded as its own history batch
    pub fn create(&self, id: ElementId, kind: ElementKind, payload: Payload) -> StoreResult<Arc<Element>> {
        self.write(|state, weak| {
            let pre = state.store.get(&id).ok();
            let post = state.store.create(id, kind, payload)?;
            state.record(vec![ElementDelta::new(pre, post.clone())], RecordMode::Immediate, weak);
            Ok(post)
        })
    }

    pub fn get(&self, id: &ElementId) -> StoreResult<Arc<Element>> {
        self.read(|state| state.store.get(id))
    }

    /// Update an element's payload without recording history. The redo
    /// side is dropped, as after any new local edit.
    pub fn update<F>(&self, id: &ElementId, mutation: F) -> StoreResult<Arc<Element>>
    where
        F: FnOnce(&mut Payload),
    {
        self.write(|state, _| {
            let post = state.store.update(id, mutation)?;
            state.history.truncate_redo();
            Ok(post)
        })
    }

    /// Update an element and record the change
    pub fn edit<F>(&self, id: &ElementId, mode: RecordMode, mutation: F) -> StoreResult<Arc<Element>>
    where
        F: FnOnce(&mut Payload),
    {
        self.write(|state, weak| {
            let pre = state.store.get(id)?;
            let post = state.store.update(id, mutation)?;
            state.record(vec![ElementDelta::new(Some(pre), post.clone())], mode, weak);
            Ok(post)
        })
    }

    /// Apply the same mutation to several elements as one history unit
    /// (group move, multi-select restyle)
    pub fn edit_many<F>(&self, ids: &[ElementId], mode: RecordMode, mut mutation: F) -> StoreResult<Vec<Arc<Element>>>
    where
        F: FnMut(&ElementId, &mut Payload),
    {
        self.write(|state, weak| {
            // Every id must exist before anything is written
            let pres = ids.iter().map(|id| state.store.get(id)).collect::<StoreResult<Vec<_>>>()?;

            let mut deltas = Vec::with_capacity(ids.len());
            for (id, pre) in ids.iter().zip(pres) {
                let post = state.store.update(id, |payload| mutation(id, payload))?;
                deltas.push(ElementDelta::new(Some(pre), post));
            }
            let posts = deltas.iter().map(|d| d.post.clone()).collect();
            state.record(deltas, mode, weak);
            Ok(posts)
        })
    }

    /// Tombstone an element; recorded as its own history batch
    pub fn delete(&self, id: &ElementId) -> StoreResult<Arc<Element>> {
        self.write(|state, weak| {
            let pre = state.store.get(id)?;
            let post = state.store.delete(id)?;
            state.record(vec![ElementDelta::new(Some(pre), post.clone())], RecordMode::Immediate, weak);
            Ok(post)
        })
    }

    /// Clear a tombstone; recorded as its own history batch
    pub fn restore(&self, id: &ElementId) -> StoreResult<Arc<Element>> {
        self.write(|state, weak| {
            let pre = state.store.get(id)?;
            let post = state.store.restore(id)?;
            state.record(vec![ElementDelta::new(Some(pre), post.clone())], RecordMode::Immediate, weak);
            Ok(post)
        })
    }

    /// Record a write the caller made through `update`
    pub fn record(&self, pre: Option<Arc<Element>>, post: Arc<Element>, mode: RecordMode) -> StoreResult<RecordOutcome> {
        self.write(|state, weak| Ok(state.record(vec![ElementDelta::new(pre, post)], mode, weak)))
    }

    /// Record several writes as one history unit
    pub fn record_many(&self, deltas: Vec<ElementDelta>, mode: RecordMode) -> StoreResult<RecordOutcome> {
        self.write(|state, weak| Ok(state.record(deltas, mode, weak)))
    }

    /// Commit the open batch now
    pub fn commit_pending(&self) -> StoreResult<Option<u64>> {
        self.write(|state, _| {
            state.timer.cancel();
            Ok(state.history.flush())
        })
    }

    /// Commit the open batch if its window elapsed at `now`. For callers
    /// running without a tokio runtime.
    pub fn commit_expired(&self, now: Instant) -> StoreResult<Option<u64>> {
        self.write(|state, _| Ok(state.history.commit_expired(now)))
    }

    pub fn undo(&self) -> StoreResult<HistoryOutcome> {
        let op = trace_undo();
        let outcome = self.write(|state, _| {
            state.timer.cancel();
            state.history.undo(&mut state.store)
        })?;
        self.metrics.inc_history(&outcome);
        op.complete();
        Ok(outcome)
    }

    pub fn redo(&self) -> StoreResult<HistoryOutcome> {
        let op = trace_redo();
        let outcome = self.write(|state, _| {
            state.timer.cancel();
            state.history.redo(&mut state.store)
        })?;
        self.metrics.inc_history(&outcome);
        op.complete();
        Ok(outcome)
    }

    pub fn can_undo(&self) -> StoreResult<bool> {
        self.read(|state| Ok(state.history.can_undo()))
    }

    pub fn can_redo(&self) -> StoreResult<bool> {
        self.read(|state| Ok(state.history.can_redo()))
    }

    pub fn history_stats(&self) -> StoreResult<HistoryStats> {
        self.read(|state| Ok(state.history.stats()))
    }

    /// Drop all history; element state is untouched
    pub fn clear_history(&self) -> StoreResult<()> {
        self.write(|state, _| {
            state.timer.cancel();
            state.history.clear();
            Ok(())
        })
    }

    /// Apply one record from a peer or a snapshot. A payload that could not
    /// be sent on gives `MalformedElement`.
    pub fn apply_remote(&self, candidate: Element) -> StoreResult<Resolution> {
        candidate
            .payload
            .validate()
            .map_err(|reason| StoreError::MalformedElement(format!("{} on {}", reason, candidate.id)))?;
        self.write(|state, _| {
            let id = candidate.id.clone();
            let resolution = state.store.apply_remote(candidate);
            if resolution == Resolution::Applied {
                state.history.record_remote(&id);
            }
            self.metrics.inc_resolution(resolution);
            Ok(resolution)
        })
    }

    /// Decode and apply a sync message
    pub fn apply_incoming(&self, bytes: &[u8]) -> StoreResult<Vec<IncomingOutcome>> {
        // Decoding happens outside the lock
        let message = sync::SyncMessage::decode(bytes)?;
        record_counter("scene.sync.messages.in", 1);
        self.metrics.inc_messages_in();
        let op = trace_merge(message.elements.len());

        let outcomes = self.write(|state, _| {
            let outcomes = sync::apply_message(&mut state.store, message);
            for outcome in outcomes.iter().filter(|o| o.outcome.is_applied()) {
                if let Some(id) = &outcome.id {
                    state.history.record_remote(id);
                }
            }
            Ok(outcomes)
        })?;

        for incoming in &outcomes {
            match &incoming.outcome {
                ApplyOutcome::Applied => self.metrics.inc_resolution(Resolution::Applied),
                ApplyOutcome::Merged => self.metrics.inc_resolution(Resolution::Merged),
                ApplyOutcome::Rejected(RejectReason::Stale) => {
                    self.metrics.inc_resolution(Resolution::Rejected)
                }
                ApplyOutcome::Rejected(RejectReason::Malformed(reason)) => {
                    self.metrics.inc_malformed();
                    record_counter("scene.sync.malformed", 1);
                    op.record_error(reason);
                }
            }
        }
        op.complete();
        Ok(outcomes)
    }

    /// Encode everything changed locally since the last drain
    pub fn drain_outgoing(&self) -> StoreResult<Vec<Vec<u8>>> {
        let messages = {
            let mut state = self.state.write().map_err(handle_poison)?;
            let state = &mut *state;
            state.outbox.drain(&state.store)?
        };
        self.metrics.add_messages_out(messages.len() as u64);
        Ok(messages)
    }

    /// Encode the whole scene for a joining peer
    pub fn full_scene_messages(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.read(|state| state.outbox.full_scene(&state.store))
    }

    /// Number of ids waiting in the outbox
    pub fn pending_outgoing(&self) -> StoreResult<usize> {
        self.read(|state| Ok(state.outbox.pending()))
    }

    /// Periodically drain the outbox into `sender`. Requires a tokio
    /// runtime; stops once the receiver is dropped.
    pub fn spawn_outbox_flusher(&self, sender: mpsc::Sender<Vec<u8>>) -> JoinHandle<()> {
        let scene = self.clone();
        sync::spawn_flusher(self.flush_interval, sender, move || scene.drain_outgoing())
    }

    /// Elements matching `predicate`, tombstones included, over a snapshot
    /// taken now
    pub fn list<P>(&self, predicate: P) -> StoreResult<impl Iterator<Item = Arc<Element>>>
    where
        P: Fn(&Element) -> bool,
    {
        let snapshot = self.snapshot()?;
        Ok(snapshot.into_iter().filter(move |e| predicate(e)))
    }

    /// Every record, tombstones included
    pub fn snapshot(&self) -> StoreResult<Vec<Arc<Element>>> {
        self.read(|state| Ok(state.store.snapshot()))
    }

    pub fn is_live(&self, id: &ElementId) -> StoreResult<bool> {
        self.read(|state| Ok(state.store.is_live(id)))
    }

    pub fn dangling_references(&self, id: &ElementId) -> StoreResult<Vec<ElementId>> {
        self.read(|state| state.store.dangling_references(id))
    }

    /// Number of records, tombstones included
    pub fn len(&self) -> StoreResult<usize> {
        self.read(|state| Ok(state.store.len()))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.read(|state| Ok(state.store.is_empty()))
    }

    pub fn live_count(&self) -> StoreResult<usize> {
        self.read(|state| Ok(state.store.live_count()))
    }

    /// Totals since the scene was created
    pub fn metrics(&self) -> SceneMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneState {
    fn record(&mut self, deltas: Vec<ElementDelta>, mode: RecordMode, weak: &Weak<RwLock<SceneState>>) -> RecordOutcome {
        let outcome = self.history.record_many(deltas, mode, Instant::now());

        match outcome {
            RecordOutcome::Pending { generation, deadline } => {
                let weak = weak.clone();
                self.timer.schedule(deadline, move || {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    // A poisoned scene cannot commit; the batch stays open
                    if let Ok(mut state) = shared.write() {
                        if let Some(batch_id) = state.history.commit_if_current(generation) {
                            debug!(batch_id, generation, "debounced batch committed");
                        }
                    };
                });
            }
            RecordOutcome::Committed { batch_id } => {
                trace!(batch_id, "batch committed immediately");
                self.timer.cancel();
            }
            RecordOutcome::Ignored => {}
        }

        outcome
    }
}
