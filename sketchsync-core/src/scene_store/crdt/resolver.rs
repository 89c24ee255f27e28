/*
    resolver.rs - Last-writer-wins conflict resolution per element

    Each element id is an LWW register keyed by (version, tie_break):
    - no local record: take the remote one
    - higher stamp wins, regardless of tombstone state
    - identical stamp: already applied, no-op
    - lower stamp: stale, discard

    The rule is deterministic, commutative and associative, so replicas that
    observed the same set of records converge whatever the delivery order.
    Wall-clock timestamps never take part.
*/

use crate::scene_store::model::Element;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Outcome of resolving an incoming candidate against local state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Remote record replaces local state
    Applied,
    /// Remote record carries the stamp we already hold (retransmission)
    Merged,
    /// Remote record is older than local state
    Rejected,
}

impl Resolution {
    /// Whether the store must replace its record with the candidate
    pub fn replaces_local(&self) -> bool {
        matches!(self, Resolution::Applied)
    }
}

/// Decide whether `remote` wins over `local`
pub fn resolve(local: Option<&Element>, remote: &Element) -> Resolution {
    let Some(local) = local else {
        return Resolution::Applied;
    };

    match remote.stamp().cmp(&local.stamp()) {
        Ordering::Greater => Resolution::Applied,
        Ordering::Equal => Resolution::Merged,
        Ordering::Less => Resolution::Rejected,
    }
}

/// Pick the winning record of two candidates for the same id.
///
/// Used by replay paths that fold many records together; equal stamps keep
/// `a`.
pub fn winner<'a>(a: &'a Element, b: &'a Element) -> &'a Element {
    if resolve(Some(a), b).replaces_local() {
        b
    } else {
        a
    }
}
