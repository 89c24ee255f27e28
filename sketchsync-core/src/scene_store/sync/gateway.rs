/*
    gateway.rs - Apply and produce sync messages

    Incoming flow:
    1. Decode the envelope (whole message fails on bad JSON or format)
    2. Validate each element on its own
    3. Route valid elements through ElementStore::apply_remote
    4. Report one outcome per element, in message order

    Outgoing messages always carry full records, never field diffs, so a
    receiver can resolve each element with nothing but the LWW rule.
*/

use crate::scene_store::crdt::Resolution;
use crate::scene_store::model::{Element, ElementId};
use crate::scene_store::store::element_store::ElementStore;
use crate::scene_store::store::errors::StoreResult;
use crate::scene_store::sync::message::{element_from_wire, wire_element_id, MessageKind, SyncMessage};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why an incoming element was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Local record has a greater `(version, tie_break)`
    Stale,
    /// Missing or invalid fields
    Malformed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Stale => write!(f, "stale"),
            RejectReason::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}

/// Result of applying one incoming element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Merged,
    Rejected(RejectReason),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ApplyOutcome::Rejected(_))
    }
}

impl From<Resolution> for ApplyOutcome {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Applied => ApplyOutcome::Applied,
            Resolution::Merged => ApplyOutcome::Merged,
            Resolution::Rejected => ApplyOutcome::Rejected(RejectReason::Stale),
        }
    }
}

/// Outcome for one element of an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingOutcome {
    /// `None` when the record did not even carry a usable id
    pub id: Option<ElementId>,
    pub outcome: ApplyOutcome,
}

/// Encode full records into a message
pub fn encode_outgoing(kind: MessageKind, elements: &[Arc<Element>]) -> StoreResult<Vec<u8>> {
    let bytes = SyncMessage::from_elements(kind, elements).encode()?;
    debug!(?kind, elements = elements.len(), bytes = bytes.len(), "sync message encoded");
    Ok(bytes)
}

/// Decode `bytes` and apply every element to `store`
pub fn apply_incoming(store: &mut ElementStore, bytes: &[u8]) -> StoreResult<Vec<IncomingOutcome>> {
    let message = SyncMessage::decode(bytes)?;
    Ok(apply_message(store, message))
}

/// Apply an already decoded message
pub fn apply_message(store: &mut ElementStore, message: SyncMessage) -> Vec<IncomingOutcome> {
    let mut outcomes = Vec::with_capacity(message.elements.len());

    for raw in message.elements {
        let reported_id = wire_element_id(&raw);
        let outcome = match element_from_wire(raw) {
            Ok(candidate) => {
                let id = candidate.id.clone();
                let outcome = ApplyOutcome::from(store.apply_remote(candidate));
                IncomingOutcome { id: Some(id), outcome }
            }
            Err(err) => {
                warn!(id = ?reported_id, error = %err, "malformed remote element rejected");
                IncomingOutcome {
                    id: reported_id,
                    outcome: ApplyOutcome::Rejected(RejectReason::Malformed(err.to_string())),
                }
            }
        };
        outcomes.push(outcome);
    }

    debug!(kind = ?message.kind, elements = outcomes.len(), "sync message applied");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_store::crdt::VersionAllocator;
    use crate::scene_store::model::{ElementKind, Payload};
    use crate::scene_store::store::errors::StoreError;
    use serde_json::json;

    fn store(seed: u64) -> ElementStore {
        ElementStore::with_allocator(VersionAllocator::seeded(seed))
    }

    #[test]
    fn test_outgoing_applies_on_peer() {
        let mut a = store(1);
        let el = a.create(ElementId::new("r"), ElementKind::Rectangle, Payload::new().with("x", 3)).unwrap();
        let bytes = encode_outgoing(MessageKind::SceneUpdate, &[el.clone()]).unwrap();

        let mut b = store(2);
        let outcomes = apply_incoming(&mut b, &bytes).unwrap();
        assert_eq!(outcomes, vec![IncomingOutcome { id: Some(ElementId::new("r")), outcome: ApplyOutcome::Applied }]);
        assert_eq!(*b.get(&ElementId::new("r")).unwrap(), *el);
    }

    #[test]
    fn test_retransmission_is_merged() {
        let mut a = store(1);
        let el = a.create(ElementId::new("r"), ElementKind::Rectangle, Payload::new()).unwrap();
        let bytes = encode_outgoing(MessageKind::SceneUpdate, &[el]).unwrap();

        let mut b = store(2);
        apply_incoming(&mut b, &bytes).unwrap();
        let outcomes = apply_incoming(&mut b, &bytes).unwrap();
        assert_eq!(outcomes[0].outcome, ApplyOutcome::Merged);
    }

    #[test]
    fn test_stale_is_rejected() {
        let mut a = store(1);
        let old = a.create(ElementId::new("r"), ElementKind::Rectangle, Payload::new()).unwrap();
        let new = a.update(&ElementId::new("r"), |p| p.set("x", 1)).unwrap();

        let mut b = store(2);
        apply_incoming(&mut b, &encode_outgoing(MessageKind::SceneUpdate, &[new]).unwrap()).unwrap();
        let outcomes =
            apply_incoming(&mut b, &encode_outgoing(MessageKind::SceneUpdate, &[old]).unwrap()).unwrap();
        assert_eq!(outcomes[0].outcome, ApplyOutcome::Rejected(RejectReason::Stale));
    }

    #[test]
    fn test_malformed_element_only_rejects_itself() {
        let bytes = serde_json::to_vec(&json!({
            "formatVersion": 1,
            "type": "SCENE_UPDATE",
            "elements": [
                { "id": "bad", "type": "rectangle", "versionNonce": 1, "isDeleted": false },
                { "id": "good", "type": "ellipse", "version": 1, "versionNonce": 9, "isDeleted": false }
            ]
        }))
        .unwrap();

        let mut b = store(2);
        let outcomes = apply_incoming(&mut b, &bytes).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].id, Some(ElementId::new("bad")));
        assert!(matches!(outcomes[0].outcome, ApplyOutcome::Rejected(RejectReason::Malformed(_))));
        assert!(outcomes[1].outcome.is_applied());
        assert!(!b.contains(&ElementId::new("bad")));
        assert!(b.is_live(&ElementId::new("good")));
    }

    #[test]
    fn test_empty_message_yields_no_outcomes() {
        let bytes = encode_outgoing(MessageKind::SceneUpdate, &[]).unwrap();
        let mut b = store(2);
        assert!(apply_incoming(&mut b, &bytes).unwrap().is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_undecodable_bytes_fail_whole_message() {
        let mut b = store(2);
        assert!(matches!(apply_incoming(&mut b, b"\x00\x01"), Err(StoreError::Deserialization(_))));
    }
}
