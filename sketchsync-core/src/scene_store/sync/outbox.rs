/*
    outbox.rs - Coalescing queue of locally changed elements

    Local writes mark ids dirty. Draining reads the current record of each
    dirty id, so ten edits of one element between flushes go out as one
    record. Remote applications never mark ids: peers already have them.

    Messages are chunked so a single message never carries more than
    `max_elements_per_message` records.
*/

use crate::metrics::record_counter;
use crate::scene_store::model::{Element, ElementId};
use crate::scene_store::store::element_store::ElementStore;
use crate::scene_store::store::errors::StoreResult;
use crate::scene_store::sync::gateway::encode_outgoing;
use crate::scene_store::sync::message::MessageKind;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default cap on records per message
pub const DEFAULT_MAX_ELEMENTS_PER_MESSAGE: usize = 500;

#[derive(Debug)]
pub struct Outbox {
    dirty: BTreeSet<ElementId>,
    max_elements_per_message: usize,
}

impl Outbox {
    pub fn new(max_elements_per_message: usize) -> Self {
        Outbox { dirty: BTreeSet::new(), max_elements_per_message: max_elements_per_message.max(1) }
    }

    pub fn mark_dirty(&mut self, id: ElementId) {
        self.dirty.insert(id);
    }

    /// Number of ids waiting to be sent
    pub fn pending(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Encode the current record of every dirty id as `SCENE_UPDATE`
    /// messages and clear the queue
    pub fn drain(&mut self, store: &ElementStore) -> StoreResult<Vec<Vec<u8>>> {
        if self.dirty.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<Arc<Element>> =
            self.dirty.iter().filter_map(|id| store.get(id).ok()).collect();
        let messages = self.encode_chunks(MessageKind::SceneUpdate, &records)?;
        self.dirty.clear();

        record_counter("scene.sync.messages.out", messages.len() as u64);
        debug!(elements = records.len(), messages = messages.len(), "outbox drained");
        Ok(messages)
    }

    /// Encode the whole store, tombstones included, as `SCENE_INIT`
    /// messages for a joining peer. The dirty queue is left alone.
    pub fn full_scene(&self, store: &ElementStore) -> StoreResult<Vec<Vec<u8>>> {
        self.encode_chunks(MessageKind::SceneInit, &store.snapshot())
    }

    fn encode_chunks(&self, kind: MessageKind, records: &[Arc<Element>]) -> StoreResult<Vec<Vec<u8>>> {
        records.chunks(self.max_elements_per_message).map(|chunk| encode_outgoing(kind, chunk)).collect()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ELEMENTS_PER_MESSAGE)
    }
}

/// Spawn a task that calls `drain` every `period` and forwards the
/// messages to `sender`. Stops when the receiving side is dropped.
pub fn spawn_flusher<F>(period: Duration, sender: mpsc::Sender<Vec<u8>>, mut drain: F) -> JoinHandle<()>
where
    F: FnMut() -> StoreResult<Vec<Vec<u8>>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let messages = match drain() {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(error = %err, "outbox drain failed");
                    continue;
                }
            };

            for message in messages {
                if sender.send(message).await.is_err() {
                    info!("outbox receiver closed, flusher stopping");
                    return;
                }
            }
        }
    })
}
