//! Test fixtures for creating common test objects
//!
//! Provides builders for element records and helpers for wiring scenes
//! together without a transport.

use crate::scene_store::crdt::VersionStamp;
use crate::scene_store::model::{Element, ElementId, ElementKind, FieldValue, Payload, Timestamp};
use crate::scene_store::scene::Scene;
use crate::scene_store::sync::IncomingOutcome;

/// Builder for element records as a peer would send them
pub struct TestElementBuilder {
    id: ElementId,
    kind: ElementKind,
    stamp: VersionStamp,
    deleted: bool,
    payload: Payload,
}

impl TestElementBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: ElementId::new(id),
            kind: ElementKind::Rectangle,
            stamp: VersionStamp::new(1, 0),
            deleted: false,
            payload: Payload::new(),
        }
    }

    pub fn kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn version(mut self, version: u64, tie_break: u32) -> Self {
        self.stamp = VersionStamp::new(version, tie_break);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.payload.set(key, value);
        self
    }

    pub fn at(self, x: f64, y: f64) -> Self {
        self.field("x", x).field("y", y)
    }

    pub fn build(self) -> Element {
        let mut element = Element::new(self.id, self.kind, self.payload, self.stamp);
        element.deleted = self.deleted;
        element.updated_at = Timestamp::from_millis(0);
        element
    }
}

/// Payload with a position
pub fn positioned(x: f64, y: f64) -> Payload {
    Payload::new().with("x", x).with("y", y)
}

/// `(x, y)` of an element, if both are numbers
pub fn position(element: &Element) -> Option<(f64, f64)> {
    let x = element.payload.get("x")?.as_number()?;
    let y = element.payload.get("y")?.as_number()?;
    Some((x, y))
}

/// Move everything `from` changed locally into `to`
pub fn replicate(from: &Scene, to: &Scene) -> Vec<IncomingOutcome> {
    let mut outcomes = Vec::new();
    for message in from.drain_outgoing().expect("drain outgoing") {
        outcomes.extend(to.apply_incoming(&message).expect("apply incoming"));
    }
    outcomes
}

/// Exchange pending changes in both directions
pub fn exchange(a: &Scene, b: &Scene) {
    let from_a = a.drain_outgoing().expect("drain a");
    let from_b = b.drain_outgoing().expect("drain b");
    for message in from_a {
        b.apply_incoming(&message).expect("apply on b");
    }
    for message in from_b {
        a.apply_incoming(&message).expect("apply on a");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::seeded_scene;

    #[test]
    fn test_element_builder() {
        let el = TestElementBuilder::new("r").version(3, 9).at(1.0, 2.0).deleted().build();
        assert_eq!(el.stamp(), VersionStamp::new(3, 9));
        assert!(el.deleted);
        assert_eq!(position(&el), Some((1.0, 2.0)));
    }

    #[test]
    fn test_replicate_moves_local_changes() {
        let a = seeded_scene(1);
        let b = seeded_scene(2);
        a.create(ElementId::new("r"), ElementKind::Rectangle, positioned(0.0, 0.0)).unwrap();

        let outcomes = replicate(&a, &b);
        assert_eq!(outcomes.len(), 1);
        assert!(b.is_live(&ElementId::new("r")).unwrap());
    }
}
