//! Scene assertions with readable failure messages

use crate::scene_store::model::Element;
use crate::scene_store::scene::Scene;
use std::sync::Arc;

/// Assert that two replicas hold identical records, tombstones included
pub fn assert_converged(a: &Scene, b: &Scene) {
    let left = a.snapshot().expect("snapshot a");
    let right = b.snapshot().expect("snapshot b");

    if left.len() != right.len() {
        panic!("replicas differ in size: {} vs {}", left.len(), right.len());
    }
    for (x, y) in left.iter().zip(right.iter()) {
        if x != y {
            panic!("replicas diverged on {}:\n  left:  {:?}\n  right: {:?}", x.id, x, y);
        }
    }
}

/// Assert that no record of `after` is older than its counterpart in
/// `before`
pub fn assert_versions_monotonic(before: &[Arc<Element>], after: &[Arc<Element>]) {
    for old in before {
        match after.iter().find(|e| e.id == old.id) {
            Some(new) if new.stamp() < old.stamp() => panic!(
                "version of {} moved backwards: {} -> {}",
                old.id,
                old.stamp(),
                new.stamp()
            ),
            Some(_) => {}
            None => panic!("record {} disappeared", old.id),
        }
    }
}
