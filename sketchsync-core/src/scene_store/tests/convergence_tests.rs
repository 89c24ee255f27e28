/*
    Convergence tests - replicas fed the same records in any order

    Tests:
    1. Same final state regardless of delivery order
    2. Duplicated delivery is harmless
    3. Highest stamp wins per element, tombstones included
    4. Versions never move backwards on a replica
*/

use crate::scene_store::crdt::{Resolution, VersionStamp};
use crate::scene_store::model::{Element, ElementId, ElementKind, Payload};
use crate::test_utils::{
    assert_converged, assert_versions_monotonic, seeded_scene, shuffled, TestElementBuilder,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

const IDS: [&str; 3] = ["a", "b", "c"];

/// Record fully determined by its id and stamp, so equal stamps always
/// carry equal content
fn record(id_idx: usize, version: u64, tie_break: u32) -> Element {
    let mut builder = TestElementBuilder::new(IDS[id_idx])
        .version(version, tie_break)
        .at((version * 100 + tie_break as u64) as f64, version as f64);
    if tie_break % 3 == 0 {
        builder = builder.deleted();
    }
    builder.build()
}

fn expected_winners(records: &[Element]) -> BTreeMap<ElementId, VersionStamp> {
    let mut winners: BTreeMap<ElementId, VersionStamp> = BTreeMap::new();
    for r in records {
        let entry = winners.entry(r.id.clone()).or_insert(r.stamp());
        if r.stamp() > *entry {
            *entry = r.stamp();
        }
    }
    winners
}

#[test]
fn test_two_orders_converge() {
    let records = vec![record(0, 1, 5), record(0, 2, 7), record(0, 2, 9), record(1, 1, 4)];

    let forward = seeded_scene(1);
    let backward = seeded_scene(2);
    for r in records.iter().cloned() {
        forward.apply_remote(r).unwrap();
    }
    for r in records.iter().rev().cloned() {
        backward.apply_remote(r).unwrap();
    }

    assert_converged(&forward, &backward);
    assert_eq!(forward.get(&ElementId::new("a")).unwrap().stamp(), VersionStamp::new(2, 9));
}

#[test]
fn test_redelivery_is_merged() {
    let scene = seeded_scene(3);
    let r = record(0, 4, 1);

    assert_eq!(scene.apply_remote(r.clone()).unwrap(), Resolution::Applied);
    assert_eq!(scene.apply_remote(r.clone()).unwrap(), Resolution::Merged);
    assert_eq!(scene.apply_remote(r).unwrap(), Resolution::Merged);
    assert_eq!(scene.len().unwrap(), 1);
}

#[test]
fn test_tombstone_wins_only_with_higher_stamp() {
    let scene = seeded_scene(4);
    let live = TestElementBuilder::new("a").version(3, 2).build();
    let old_tombstone = TestElementBuilder::new("a").version(2, 99).deleted().build();
    let new_tombstone = TestElementBuilder::new("a").version(4, 0).deleted().build();

    scene.apply_remote(live).unwrap();
    assert_eq!(scene.apply_remote(old_tombstone).unwrap(), Resolution::Rejected);
    assert!(scene.is_live(&ElementId::new("a")).unwrap());

    assert_eq!(scene.apply_remote(new_tombstone).unwrap(), Resolution::Applied);
    assert!(!scene.is_live(&ElementId::new("a")).unwrap());
    // Tombstone stays in the arena
    assert_eq!(scene.len().unwrap(), 1);
}

#[test]
fn test_equal_version_decided_by_tie_break_on_every_replica() {
    let low = TestElementBuilder::new("a").version(2, 10).at(10.0, 10.0).build();
    let high = TestElementBuilder::new("a").version(2, 11).at(20.0, 20.0).build();

    let r1 = seeded_scene(5);
    let r2 = seeded_scene(6);
    r1.apply_remote(low.clone()).unwrap();
    r1.apply_remote(high.clone()).unwrap();
    r2.apply_remote(high).unwrap();
    assert_eq!(r2.apply_remote(low).unwrap(), Resolution::Rejected);

    assert_converged(&r1, &r2);
    assert_eq!(r1.get(&ElementId::new("a")).unwrap().version_tie_break, 11);
}

#[test]
fn test_local_edits_replicated_in_shuffled_order() {
    let source = seeded_scene(7);
    let mut captured = Vec::new();
    for i in 0..8 {
        let id = ElementId::new(format!("e{}", i));
        source.create(id.clone(), ElementKind::Ellipse, Payload::new()).unwrap();
        source.update(&id, |p| p.set("x", i)).unwrap();
        if i % 2 == 0 {
            source.delete(&id).unwrap();
        }
    }
    for element in source.snapshot().unwrap() {
        captured.push(Element::clone(&element));
    }

    let target = seeded_scene(8);
    for r in shuffled(captured, 11) {
        target.apply_remote(r).unwrap();
    }
    assert_converged(&source, &target);
}

proptest! {
    #[test]
    fn prop_any_delivery_order_converges(
        raw in prop::collection::vec((0..IDS.len(), 1..6u64, 0..8u32), 1..30),
        seed in any::<u64>(),
    ) {
        let records: Vec<Element> = raw.iter().map(|(i, v, t)| record(*i, *v, *t)).collect();

        let in_order = seeded_scene(1);
        for r in records.iter().cloned() {
            in_order.apply_remote(r).unwrap();
        }

        // Shuffled, with every record delivered twice
        let mut doubled = records.clone();
        doubled.extend(records.iter().cloned());
        let reordered = seeded_scene(2);
        for r in shuffled(doubled, seed) {
            reordered.apply_remote(r).unwrap();
        }

        assert_converged(&in_order, &reordered);
        for (id, stamp) in expected_winners(&records) {
            prop_assert_eq!(reordered.get(&id).unwrap().stamp(), stamp);
        }
    }

    #[test]
    fn prop_replay_is_idempotent(
        raw in prop::collection::vec((0..IDS.len(), 1..6u64, 0..8u32), 1..20),
    ) {
        let scene = seeded_scene(3);
        for (i, v, t) in &raw {
            scene.apply_remote(record(*i, *v, *t)).unwrap();
        }
        let before = scene.snapshot().unwrap();

        for (i, v, t) in &raw {
            let resolution = scene.apply_remote(record(*i, *v, *t)).unwrap();
            prop_assert_ne!(resolution, Resolution::Applied);
        }
        prop_assert_eq!(before, scene.snapshot().unwrap());
    }

    #[test]
    fn prop_versions_never_decrease(
        raw in prop::collection::vec((0..IDS.len(), 1..6u64, 0..8u32), 1..20),
    ) {
        let scene = seeded_scene(4);
        let mut previous = Vec::new();
        for (i, v, t) in &raw {
            scene.apply_remote(record(*i, *v, *t)).unwrap();
            let current = scene.snapshot().unwrap();
            assert_versions_monotonic(&previous, &current);
            previous = current;
        }
    }
}
